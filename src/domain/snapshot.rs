//! Serialisable state of an evolved prediction tree, so a run can resume
//! where the last one stopped.

use crate::domain::coefficient::CoefValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SNAPSHOT_VERSION: u32 = 1;

/// One axis: its target, the values fixed above it and every slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub model: String,
    pub target: String,
    pub bound: BTreeMap<String, CoefValue>,
    pub slots: Vec<SlotSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub value: CoefValue,
    /// Wrongness samples, oldest first.
    pub history: Vec<f64>,
    /// The nested axis, absent for predictor leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<TreeSnapshot>,
}

/// A root axis as the boss scores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSnapshot {
    pub history: Vec<f64>,
    pub tree: TreeSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossSnapshot {
    pub version: u32,
    pub exchange_id: u32,
    /// Clock time when the snapshot was taken.
    pub saved_at: f64,
    pub roots: Vec<RootSnapshot>,
}

impl BossSnapshot {
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(|r| r.tree.model.as_str())
    }
}
