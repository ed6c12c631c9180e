//! Wires predictors to the indicators and storage of the datasource they
//! forecast.

use super::{Predictor, PredictorModel};
use crate::domain::coefficient::CoefficientSet;
use crate::domain::error::HorseError;
use crate::domain::indicator::IndicatorFactory;
use crate::domain::storage::StorageEngine;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PredictorFactory {
    indicators: Arc<IndicatorFactory>,
    exchange_id: u32,
}

impl PredictorFactory {
    /// `exchange_id` is the market whose price is being forecast.
    pub fn new(indicators: Arc<IndicatorFactory>, exchange_id: u32) -> Self {
        Self {
            indicators,
            exchange_id,
        }
    }

    pub fn exchange_id(&self) -> u32 {
        self.exchange_id
    }

    pub fn storage(&self) -> &StorageEngine {
        self.indicators.storage()
    }

    pub fn create(
        &self,
        model: Arc<dyn PredictorModel>,
        coefficients: CoefficientSet,
    ) -> Result<Predictor, HorseError> {
        let indicators = self
            .indicators
            .create_from_required(model.required_indicators(), self.exchange_id);
        Predictor::new(
            model,
            coefficients,
            indicators,
            self.storage().clone(),
            self.exchange_id,
        )
    }
}
