//! Collateral adapter with a fixed exchange rate.

use rust_decimal::Decimal;

use super::CollateralAdapter;
use crate::types::{floor_amount, AdapterId, Amount, Ratio};

/// Mints `rate` collateral units per paired-asset unit.
#[derive(Debug, Clone)]
pub struct FixedRateAdapter {
    id: AdapterId,
    rate: Ratio,
}

impl FixedRateAdapter {
    pub fn new(id: AdapterId, rate: Ratio) -> Self {
        Self { id, rate }
    }
}

impl CollateralAdapter for FixedRateAdapter {
    fn id(&self) -> AdapterId {
        self.id.clone()
    }

    fn join(&self, paired_amount: Amount) -> Amount {
        if paired_amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        floor_amount(paired_amount * self.rate)
    }

    fn exit(&self, collateral_amount: Amount) -> Amount {
        if collateral_amount <= Decimal::ZERO || self.rate.is_zero() {
            return Decimal::ZERO;
        }
        floor_amount(collateral_amount / self.rate)
    }
}
