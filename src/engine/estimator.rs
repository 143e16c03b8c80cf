//! Estimation engine.
//!
//! Pure functions over a `MarketSnapshot`: no collaborator is touched, no
//! clock or randomness is read, so identical snapshots give identical
//! quotes.

use rust_decimal::Decimal;

use super::planner::{plan_unwind, plan_wind, MarketSnapshot, PlannerParams, WindParams};
use crate::types::{Amount, EngineError, EstimateResult};

/// Quote a wind of `principal`.
///
/// `estimated_cost` is the value lost on the wind leg: principal minus the
/// amount handed back minus the equity added to the position.
pub fn estimate_wind(
    snapshot: &MarketSnapshot,
    principal: Amount,
    planner: &PlannerParams,
    wind: &WindParams,
) -> Result<EstimateResult, EngineError> {
    if principal.is_zero() {
        return Ok(EstimateResult::zero());
    }
    let plan = plan_wind(snapshot, principal, planner, wind)?;
    let schedule = &plan.schedule;
    let equity_added = schedule.total_collateral_value() - schedule.total_borrowed();
    Ok(EstimateResult {
        estimated_cost: principal - schedule.remaining - equity_added,
        estimated_remaining_value: schedule.remaining,
        iterations_used: schedule.iterations(),
        projected_collateral_ratio: plan.projected_ratio(snapshot),
    })
}

/// Quote a full close of the snapshot's position.
pub fn estimate_unwind(
    snapshot: &MarketSnapshot,
    max_iterations: u32,
) -> Result<EstimateResult, EngineError> {
    if snapshot.position.is_empty() {
        return Ok(EstimateResult::zero());
    }
    let schedule = plan_unwind(snapshot, max_iterations)?;
    Ok(EstimateResult {
        estimated_cost: snapshot.equity() - schedule.residual,
        estimated_remaining_value: schedule.residual,
        iterations_used: schedule.iterations(),
        projected_collateral_ratio: Decimal::ZERO,
    })
}

/// Quote a wind of `principal` followed by a full unwind on the post-wind
/// pool and position.
///
/// Equity the owner already held before the wind is excluded, so the cost
/// is what the round trip itself loses.
pub fn estimate_round_trip(
    snapshot: &MarketSnapshot,
    principal: Amount,
    planner: &PlannerParams,
    wind: &WindParams,
) -> Result<EstimateResult, EngineError> {
    if principal.is_zero() {
        return Ok(EstimateResult::zero());
    }
    let plan = plan_wind(snapshot, principal, planner, wind)?;
    let after = plan.apply_to(snapshot);
    let unwind = plan_unwind(&after, planner.max_iterations)?;
    let recovered = plan.schedule.remaining + unwind.residual - snapshot.equity();
    Ok(EstimateResult {
        estimated_cost: principal - recovered,
        estimated_remaining_value: recovered,
        iterations_used: plan.schedule.iterations() + unwind.iterations(),
        projected_collateral_ratio: plan.projected_ratio(snapshot),
    })
}
