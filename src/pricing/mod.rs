//! Swap pricing models.
//!
//! A `PricingModel` maps pool reserves and an input amount to an output
//! amount, fees included. The estimator and the in-memory pool share the
//! same model, so simulated schedules see the same price impact a live
//! swap would. Implementations:
//! - `ConstantSum`: 1:1 up to the output reserve
//! - `ConstantProduct`: x·y = k (Uniswap v2 style, fee on input)
//! - `StableSwap`: Curve invariant for two coins (fee on output)

pub mod constant_product;
pub mod stable_swap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::types::{floor_amount, Amount, AssetId, EngineError, Ratio};

pub use constant_product::ConstantProduct;
pub use stable_swap::StableSwap;

/// Replaceable price-impact function of a swap venue.
pub trait PricingModel: fmt::Debug + Send + Sync {
    /// Short model name for logging.
    fn name(&self) -> &'static str;

    /// Swap fee as a fraction of the trade.
    fn fee(&self) -> Ratio;

    /// Output for `amount_in` against `(reserve_in, reserve_out)`, fee applied.
    /// Returns zero when the pool cannot produce any output.
    fn amount_out(&self, reserve_in: Amount, reserve_out: Amount, amount_in: Amount) -> Amount;
}

// ---------------------------------------------------------------------------
// Constant sum
// ---------------------------------------------------------------------------

/// Flat 1:1 exchange capped by the output reserve.
#[derive(Debug, Clone)]
pub struct ConstantSum {
    pub fee: Ratio,
}

impl PricingModel for ConstantSum {
    fn name(&self) -> &'static str {
        "constant-sum"
    }

    fn fee(&self) -> Ratio {
        self.fee
    }

    fn amount_out(&self, _reserve_in: Amount, reserve_out: Amount, amount_in: Amount) -> Amount {
        if amount_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        floor_amount(amount_in * (Decimal::ONE - self.fee)).min(reserve_out)
    }
}

// ---------------------------------------------------------------------------
// Curve kind (config-facing)
// ---------------------------------------------------------------------------

/// Pricing model selector used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    ConstantSum,
    ConstantProduct,
    StableSwap,
}

impl CurveKind {
    /// Build a pricing model. `amplification` is only used by `StableSwap`.
    pub fn build(self, fee: Ratio, amplification: Decimal) -> Arc<dyn PricingModel> {
        match self {
            CurveKind::ConstantSum => Arc::new(ConstantSum { fee }),
            CurveKind::ConstantProduct => Arc::new(ConstantProduct { fee }),
            CurveKind::StableSwap => Arc::new(StableSwap { amplification, fee }),
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveKind::ConstantSum => write!(f, "constant_sum"),
            CurveKind::ConstantProduct => write!(f, "constant_product"),
            CurveKind::StableSwap => write!(f, "stable_swap"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool curve
// ---------------------------------------------------------------------------

/// Two-asset pool state plus its pricing model.
///
/// Cloning is cheap (the model is shared), which lets the planner walk a
/// schedule forward on a private copy without touching the live venue.
#[derive(Debug, Clone)]
pub struct PoolCurve {
    asset_a: AssetId,
    asset_b: AssetId,
    reserve_a: Amount,
    reserve_b: Amount,
    model: Arc<dyn PricingModel>,
}

impl PoolCurve {
    pub fn new(
        asset_a: AssetId,
        reserve_a: Amount,
        asset_b: AssetId,
        reserve_b: Amount,
        model: Arc<dyn PricingModel>,
    ) -> Self {
        Self {
            asset_a,
            asset_b,
            reserve_a,
            reserve_b,
            model,
        }
    }

    pub fn reserve_of(&self, asset: &AssetId) -> Option<Amount> {
        if *asset == self.asset_a {
            Some(self.reserve_a)
        } else if *asset == self.asset_b {
            Some(self.reserve_b)
        } else {
            None
        }
    }

    pub fn contains(&self, asset: &AssetId) -> bool {
        *asset == self.asset_a || *asset == self.asset_b
    }

    fn reserves_for(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<(Amount, Amount, bool), EngineError> {
        if *asset_in == self.asset_a && *asset_out == self.asset_b {
            Ok((self.reserve_a, self.reserve_b, true))
        } else if *asset_in == self.asset_b && *asset_out == self.asset_a {
            Ok((self.reserve_b, self.reserve_a, false))
        } else {
            Err(EngineError::InvalidParameter(format!(
                "pool {}/{} cannot swap {asset_in} -> {asset_out}",
                self.asset_a, self.asset_b
            )))
        }
    }

    /// Output for a swap, without changing reserves.
    pub fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount, EngineError> {
        let (reserve_in, reserve_out, _) = self.reserves_for(asset_in, asset_out)?;
        let out = self.model.amount_out(reserve_in, reserve_out, amount_in);
        Ok(floor_amount(out.max(Decimal::ZERO).min(reserve_out)))
    }

    /// Move reserves for a swap that paid `amount_out`.
    pub fn settle(
        &mut self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
        amount_out: Amount,
    ) -> Result<(), EngineError> {
        let (reserve_in, reserve_out, a_to_b) = self.reserves_for(asset_in, asset_out)?;
        let Some(grown) = reserve_in.checked_add(amount_in) else {
            return Err(EngineError::InvalidParameter(format!(
                "swap of {amount_in} {asset_in} exceeds the pool's representable reserves"
            )));
        };
        let shrunk = reserve_out - amount_out;
        if a_to_b {
            self.reserve_a = grown;
            self.reserve_b = shrunk;
        } else {
            self.reserve_b = grown;
            self.reserve_a = shrunk;
        }
        Ok(())
    }

    /// Quote and settle in one go.
    pub fn apply(
        &mut self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount, EngineError> {
        let out = self.quote(asset_in, asset_out, amount_in)?;
        self.settle(asset_in, asset_out, amount_in, out)?;
        Ok(out)
    }
}

impl fmt::Display for PoolCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}={:.2} {}={:.2}",
            self.model.name(),
            self.asset_a,
            self.reserve_a,
            self.asset_b,
            self.reserve_b
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
