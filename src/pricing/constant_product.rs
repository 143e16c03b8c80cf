//! Constant-product pricing (x·y = k), fee charged on the input.

use rust_decimal::Decimal;

use super::PricingModel;
use crate::types::{floor_amount, Amount, Ratio};

#[derive(Debug, Clone)]
pub struct ConstantProduct {
    pub fee: Ratio,
}

impl PricingModel for ConstantProduct {
    fn name(&self) -> &'static str {
        "constant-product"
    }

    fn fee(&self) -> Ratio {
        self.fee
    }

    fn amount_out(&self, reserve_in: Amount, reserve_out: Amount, amount_in: Amount) -> Amount {
        if amount_in <= Decimal::ZERO || reserve_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let in_after_fee = amount_in * (Decimal::ONE - self.fee);
        let out = in_after_fee
            .checked_mul(reserve_out)
            .zip(reserve_in.checked_add(in_after_fee))
            .and_then(|(numerator, denominator)| numerator.checked_div(denominator));
        match out {
            Some(out) => floor_amount(out).min(reserve_out),
            // beyond Decimal range: the pool is all but drained, but cannot quote it
            None => Decimal::ZERO,
        }
    }
}
