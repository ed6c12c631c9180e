//! Creates indicators with their children resolved, one shared instance per
//! (kind, exchange).

use super::{Indicator, IndicatorKind};
use crate::domain::storage::StorageEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Indicators resolved for a consumer, looked up by kind.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    indicators: HashMap<IndicatorKind, Arc<Indicator>>,
}

impl IndicatorSet {
    pub fn get(&self, kind: IndicatorKind) -> Option<&Arc<Indicator>> {
        self.indicators.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

pub struct IndicatorFactory {
    storage: StorageEngine,
    lru_capacity: usize,
    cache: Mutex<HashMap<(IndicatorKind, u32), Arc<Indicator>>>,
}

impl IndicatorFactory {
    pub fn new(storage: StorageEngine, lru_capacity: usize) -> Self {
        Self {
            storage,
            lru_capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// The shared instance of `kind` for `exchange_id`, creating it and its
    /// children on first use.
    pub fn create(&self, kind: IndicatorKind, exchange_id: u32) -> Arc<Indicator> {
        if let Some(existing) = self.lock().get(&(kind, exchange_id)) {
            return existing.clone();
        }
        let children = kind
            .requirements()
            .iter()
            .map(|child| self.create(*child, exchange_id))
            .collect();
        let indicator = Arc::new(Indicator::new(
            kind,
            exchange_id,
            self.storage.clone(),
            children,
            self.lru_capacity,
        ));
        tracing::debug!(indicator = kind.name(), exchange_id, "created indicator");
        self.lock()
            .entry((kind, exchange_id))
            .or_insert(indicator)
            .clone()
    }

    pub fn create_from_required(&self, required: &[IndicatorKind], exchange_id: u32) -> IndicatorSet {
        IndicatorSet {
            indicators: required
                .iter()
                .map(|kind| (*kind, self.create(*kind, exchange_id)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(IndicatorKind, u32), Arc<Indicator>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for IndicatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorFactory")
            .field("lru_capacity", &self.lru_capacity)
            .field("instances", &self.len())
            .finish()
    }
}
