//! Schedule generation.
//!
//! One set of functions turns a `MarketSnapshot` into wind and unwind
//! schedules. The estimator reports on them; the controllers execute them.
//! Planning never touches a live collaborator: swaps are applied to a
//! private clone of the venue's `PoolCurve`, so every tranche sees the
//! price impact of the tranches before it.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::pricing::PoolCurve;
use crate::types::{
    amount_epsilon, ceil_amount, floor_amount, AccountId, Amount, AssetId, CollateralType,
    EngineError, LeverageSchedule, LeverageStep, PairConfig, Position, Price, Ratio, StopReason,
    UnwindSchedule, UnwindStep,
};
use crate::venues::{flash_fee, CollateralAdapter, Collaborators};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Per-call wind bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindParams {
    pub max_iterations: u32,
    /// Stop once collateral value / principal reaches this.
    pub target_leverage: Option<Ratio>,
}

/// Engine-wide planning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerParams {
    pub max_iterations: u32,
    pub dust_threshold: Amount,
    pub safety_buffer: Ratio,
}

impl PlannerParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            dust_threshold: config.dust_threshold,
            safety_buffer: config.safety_buffer,
        }
    }

    pub fn wind_params(&self) -> WindParams {
        WindParams {
            max_iterations: self.max_iterations,
            target_leverage: None,
        }
    }
}

/// Per-step loan-to-value `1 / (liquidation_ratio + safety_buffer)`.
pub fn loan_to_value(liquidation_ratio: Ratio, safety_buffer: Ratio) -> Result<Ratio, EngineError> {
    let margin = liquidation_ratio + safety_buffer;
    if margin <= Decimal::ONE {
        return Err(EngineError::InvalidParameter(format!(
            "liquidation ratio {liquidation_ratio} plus buffer {safety_buffer} must exceed 1"
        )));
    }
    Ok(Decimal::ONE / margin)
}

/// Collateral that can leave a position while keeping it at the liquidation ratio.
pub fn withdrawable(collateral: Amount, debt: Amount, price: Price, liquidation_ratio: Ratio) -> Amount {
    if debt.is_zero() {
        return collateral;
    }
    let required = ceil_amount(debt * liquidation_ratio / price) + amount_epsilon();
    floor_amount(collateral - required).max(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything planning reads from the collaborators, captured at one instant.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub collateral_type: CollateralType,
    pub pair: PairConfig,
    pub debt_asset: AssetId,
    pub price: Price,
    pub liquidation_ratio: Ratio,
    pub debt_ceiling: Amount,
    /// Debt outstanding across all owners.
    pub total_debt: Amount,
    /// The owner's current position.
    pub position: Position,
    pub curve: PoolCurve,
    pub adapter: Arc<dyn CollateralAdapter>,
    pub flash_fee_rate: Ratio,
    pub flash_capacity: Amount,
}

impl MarketSnapshot {
    pub fn capture(
        collaborators: &Collaborators,
        collateral_type: &CollateralType,
        pair: &PairConfig,
        owner: &AccountId,
    ) -> Result<Self, EngineError> {
        let venue = collaborators.venue(&pair.swap_venue)?;
        let adapter = collaborators.adapter(&pair.collateral_adapter)?;
        let debt_asset = collaborators.vault.debt_asset();
        let curve = venue.curve();
        if !curve.contains(&debt_asset) || !curve.contains(&pair.paired_asset) {
            return Err(EngineError::InvalidParameter(format!(
                "venue {} does not trade {debt_asset}/{}",
                pair.swap_venue, pair.paired_asset
            )));
        }

        let price = collaborators.oracle.price(collateral_type)?;
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "non-positive price {price} for {collateral_type}"
            )));
        }

        Ok(Self {
            collateral_type: collateral_type.clone(),
            pair: pair.clone(),
            debt_asset,
            price,
            liquidation_ratio: collaborators.vault.liquidation_ratio(collateral_type)?,
            debt_ceiling: collaborators.vault.debt_ceiling(collateral_type)?,
            total_debt: collaborators.vault.total_debt(collateral_type)?,
            position: collaborators.vault.position(owner, collateral_type),
            curve,
            adapter,
            flash_fee_rate: collaborators.lender.fee_rate(),
            flash_capacity: collaborators.lender.max_flash_loan(),
        })
    }

    pub fn owner(&self) -> &AccountId {
        &self.position.owner
    }

    /// Collateral value minus debt of the owner's position.
    pub fn equity(&self) -> Amount {
        self.position.collateral_value(self.price) - self.position.debt_amount
    }
}

// ---------------------------------------------------------------------------
// Wind
// ---------------------------------------------------------------------------

/// A wind schedule plus the pool state it leaves behind.
#[derive(Debug, Clone)]
pub struct WindPlan {
    pub schedule: LeverageSchedule,
    pub curve_after: PoolCurve,
}

impl WindPlan {
    /// Collateral value / debt once the schedule has run; zero without debt.
    pub fn projected_ratio(&self, snapshot: &MarketSnapshot) -> Ratio {
        let debt = snapshot.position.debt_amount + self.schedule.total_borrowed();
        if debt.is_zero() {
            return Decimal::ZERO;
        }
        let collateral = snapshot.position.collateral_amount + self.schedule.total_collateral();
        collateral * snapshot.price / debt
    }

    /// `snapshot` as it would read after the schedule executes.
    pub fn apply_to(&self, snapshot: &MarketSnapshot) -> MarketSnapshot {
        let borrowed = self.schedule.total_borrowed();
        let mut after = snapshot.clone();
        after.position.collateral_amount += self.schedule.total_collateral();
        after.position.debt_amount += borrowed;
        after.total_debt += borrowed;
        after.curve = self.curve_after.clone();
        after
    }
}

/// Plan a wind of `principal`.
///
/// The first pass sizes the flash loan; when it carries a fee, a second
/// pass holds that fee back from the first tranche so the loan can be
/// repaid out of the final borrow plus the reserve.
pub fn plan_wind(
    snapshot: &MarketSnapshot,
    principal: Amount,
    planner: &PlannerParams,
    wind: &WindParams,
) -> Result<WindPlan, EngineError> {
    if principal < Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "principal must not be negative, got {principal}"
        )));
    }
    if principal.is_zero() || wind.max_iterations == 0 {
        return Ok(WindPlan {
            schedule: LeverageSchedule::empty(principal),
            curve_after: snapshot.curve.clone(),
        });
    }

    let ltv = loan_to_value(snapshot.liquidation_ratio, planner.safety_buffer)?;
    let first = walk_wind(snapshot, principal, Decimal::ZERO, ltv, planner, wind)?;
    let reserve = flash_fee(first.schedule.flash_amount, snapshot.flash_fee_rate);
    if reserve.is_zero() {
        return Ok(first);
    }
    walk_wind(snapshot, principal, reserve, ltv, planner, wind)
}

fn walk_wind(
    snapshot: &MarketSnapshot,
    principal: Amount,
    reserve: Amount,
    ltv: Ratio,
    planner: &PlannerParams,
    wind: &WindParams,
) -> Result<WindPlan, EngineError> {
    let debt_asset = &snapshot.debt_asset;
    let paired_asset = &snapshot.pair.paired_asset;
    let headroom = snapshot.debt_ceiling - snapshot.total_debt;

    let mut curve = snapshot.curve.clone();
    let mut steps: Vec<LeverageStep> = Vec::new();
    let mut tranche = principal - reserve;
    let mut cumulative_debt = Decimal::ZERO;
    let mut cumulative_value = Decimal::ZERO;
    let mut flashed = Decimal::ZERO;
    let mut stop = StopReason::IterationLimit;

    for index in 0..wind.max_iterations {
        if tranche <= Decimal::ZERO || tranche < planner.dust_threshold {
            stop = StopReason::Dust;
            break;
        }
        if let Some(target) = wind.target_leverage {
            let reached = target
                .checked_mul(principal)
                .is_some_and(|goal| cumulative_value >= goal);
            if index > 0 && reached {
                stop = StopReason::TargetReached;
                break;
            }
        }
        if index > 0 && flashed + tranche > snapshot.flash_capacity {
            stop = StopReason::FlashCapacity;
            break;
        }

        let mut trial = curve.clone();
        let swap_out = trial.apply(debt_asset, paired_asset, tranche)?;
        let deposit = snapshot.adapter.join(swap_out);
        if deposit.is_zero() {
            stop = StopReason::NoLiquidity;
            break;
        }
        let value = deposit * snapshot.price;
        let wanted = floor_amount(value * ltv);
        let borrow = floor_amount(wanted.min(headroom - cumulative_debt));
        if borrow <= Decimal::ZERO {
            if steps.is_empty() {
                return Err(EngineError::CeilingExceeded {
                    collateral_type: snapshot.collateral_type.clone(),
                    ceiling: snapshot.debt_ceiling,
                    requested: snapshot.total_debt + wanted,
                });
            }
            stop = StopReason::Ceiling;
            break;
        }

        curve = trial;
        if index > 0 {
            flashed += tranche;
        }
        cumulative_debt += borrow;
        cumulative_value += value;
        steps.push(LeverageStep {
            index,
            borrow_amount: borrow,
            swap_in_amount: tranche,
            swap_out_amount: swap_out,
            deposit_amount: deposit,
            cumulative_debt,
            cumulative_collateral_value: cumulative_value,
        });
        tranche = borrow;
    }

    let fee = flash_fee(flashed, snapshot.flash_fee_rate);
    let remaining = reserve + tranche - fee;
    if remaining < Decimal::ZERO {
        return Err(EngineError::LiquidityRepaymentFailed {
            owed: flashed + fee,
            available: flashed + reserve + tranche,
        });
    }

    debug!(
        principal = %principal,
        reserve = %reserve,
        steps = steps.len(),
        flash = %flashed,
        remaining = %remaining,
        stop = %stop,
        "Wind schedule planned"
    );

    Ok(WindPlan {
        schedule: LeverageSchedule {
            principal,
            reserve,
            steps,
            flash_amount: flashed,
            flash_fee: fee,
            remaining,
            stop,
        },
        curve_after: curve,
    })
}

// ---------------------------------------------------------------------------
// Unwind
// ---------------------------------------------------------------------------

/// Plan a full close of the snapshot's position.
///
/// The flash loan covers as much debt as the lender allows. Each step
/// withdraws what the vault will release, sells it for the debt asset and
/// repays from the pooled cash. An empty position yields an empty schedule.
pub fn plan_unwind(snapshot: &MarketSnapshot, max_iterations: u32) -> Result<UnwindSchedule, EngineError> {
    if snapshot.position.is_empty() {
        return Ok(UnwindSchedule::empty());
    }

    let debt_asset = &snapshot.debt_asset;
    let paired_asset = &snapshot.pair.paired_asset;
    let flash = snapshot.flash_capacity.min(snapshot.position.debt_amount).max(Decimal::ZERO);
    let fee = flash_fee(flash, snapshot.flash_fee_rate);

    let mut curve = snapshot.curve.clone();
    let mut collateral = snapshot.position.collateral_amount;
    let mut debt = snapshot.position.debt_amount;
    let mut cash = flash;
    let mut steps: Vec<UnwindStep> = Vec::new();

    for index in 0..max_iterations {
        if debt.is_zero() && collateral.is_zero() {
            break;
        }
        let withdraw = withdrawable(collateral, debt, snapshot.price, snapshot.liquidation_ratio);
        let swap_in = snapshot.adapter.exit(withdraw);
        let swap_out = if swap_in.is_zero() {
            Decimal::ZERO
        } else {
            let out = curve.apply(paired_asset, debt_asset, swap_in)?;
            if out.is_zero() {
                return Err(EngineError::SlippageExceeded {
                    minimum: amount_epsilon(),
                    actual: out,
                });
            }
            out
        };
        cash += swap_out;
        let repay = cash.min(debt);
        if withdraw.is_zero() && repay.is_zero() {
            return Err(EngineError::InsufficientCollateralToWithdraw {
                needed: ceil_amount(debt * snapshot.liquidation_ratio / snapshot.price),
                available: collateral,
            });
        }
        collateral -= withdraw;
        debt -= repay;
        cash -= repay;
        steps.push(UnwindStep {
            index,
            withdraw_amount: withdraw,
            swap_in_amount: swap_in,
            swap_out_amount: swap_out,
            repay_amount: repay,
            debt_after: debt,
            collateral_after: collateral,
        });
    }

    if !debt.is_zero() || !collateral.is_zero() {
        return Err(EngineError::IterationLimitReached(max_iterations));
    }

    let residual = cash - flash - fee;
    if residual < Decimal::ZERO {
        return Err(EngineError::LiquidityRepaymentFailed {
            owed: flash + fee,
            available: cash,
        });
    }

    debug!(
        steps = steps.len(),
        flash = %flash,
        residual = %residual,
        "Unwind schedule planned"
    );

    Ok(UnwindSchedule {
        steps,
        flash_amount: flash,
        flash_fee: fee,
        residual,
        stop: StopReason::Closed,
    })
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
