//! Static price oracle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{lock, PriceOracle};
use crate::types::{CollateralType, EngineError, Price};

/// Prices set by hand; shared between clones.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: Arc<Mutex<HashMap<CollateralType, Price>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, collateral_type: &CollateralType, price: Price) {
        lock(&self.prices).insert(collateral_type.clone(), price);
    }
}

impl PriceOracle for StaticOracle {
    fn price(&self, collateral_type: &CollateralType) -> Result<Price, EngineError> {
        lock(&self.prices)
            .get(collateral_type)
            .copied()
            .ok_or_else(|| EngineError::UnknownCollateralType(collateral_type.clone()))
    }
}
