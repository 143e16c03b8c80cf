//! Unwind controller.
//!
//! `Idle → LiquidityBorrowed → {CollateralWithdrawn → Swapping → VaultRepaid}×k
//! → LiquidityRepaid → ResidualReturned → Done`, or `Reverted`.

use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::atomic::{AtomicUnit, ControllerSettings, StateTrace};
use super::planner::{plan_unwind, MarketSnapshot};
use super::registry::PairRegistry;
use crate::types::{
    amount_epsilon, AccountId, Amount, CollateralType, EngineError, UnwindReceipt, UnwindSchedule,
};
use crate::venues::{Collaborators, FlashGrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindState {
    Idle,
    LiquidityBorrowed,
    CollateralWithdrawn,
    Swapping,
    VaultRepaid,
    LiquidityRepaid,
    ResidualReturned,
    Done,
    Reverted,
}

impl fmt::Display for UnwindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnwindState::Idle => "Idle",
            UnwindState::LiquidityBorrowed => "LiquidityBorrowed",
            UnwindState::CollateralWithdrawn => "CollateralWithdrawn",
            UnwindState::Swapping => "Swapping",
            UnwindState::VaultRepaid => "VaultRepaid",
            UnwindState::LiquidityRepaid => "LiquidityRepaid",
            UnwindState::ResidualReturned => "ResidualReturned",
            UnwindState::Done => "Done",
            UnwindState::Reverted => "Reverted",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct UnwindController {
    registry: Arc<PairRegistry>,
    settings: ControllerSettings,
}

impl UnwindController {
    pub fn new(registry: Arc<PairRegistry>, settings: ControllerSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Close `owner`'s position and return the residual value.
    pub fn unwind(
        &self,
        collaborators: &mut Collaborators,
        collateral_type: &CollateralType,
        owner: &AccountId,
        min_residual: Amount,
    ) -> Result<UnwindReceipt, EngineError> {
        let pair = self.registry.pair_config(collateral_type)?;
        let snapshot = MarketSnapshot::capture(collaborators, collateral_type, &pair, owner)?;
        if snapshot.position.is_empty() {
            return Err(EngineError::InsufficientCollateralToWithdraw {
                needed: amount_epsilon(),
                available: Decimal::ZERO,
            });
        }
        let schedule = plan_unwind(&snapshot, self.settings.planner.max_iterations)?;

        let mut trace = StateTrace::new("unwind", UnwindState::Idle);
        let mut unit = AtomicUnit::begin(collaborators);
        match self.execute(&mut unit, &snapshot, &schedule, min_residual, &mut trace) {
            Ok(outcome) => {
                unit.commit();
                trace.enter(UnwindState::Done);
                info!(
                    owner = %owner,
                    collateral_type = %collateral_type,
                    iterations = schedule.iterations(),
                    residual = %outcome.residual,
                    "Unwind committed"
                );
                Ok(UnwindReceipt {
                    id: Uuid::new_v4(),
                    owner: owner.clone(),
                    collateral_type: collateral_type.clone(),
                    iterations: schedule.iterations(),
                    debt_repaid: outcome.debt_repaid,
                    collateral_withdrawn: outcome.collateral_withdrawn,
                    flash_amount: schedule.flash_amount,
                    flash_fee: outcome.flash_fee,
                    residual: outcome.residual,
                    closed_at: Utc::now(),
                    states: trace.names(),
                })
            }
            Err(e) => {
                trace.revert(UnwindState::Reverted, &e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        unit: &mut AtomicUnit<'_>,
        snapshot: &MarketSnapshot,
        schedule: &UnwindSchedule,
        min_residual: Amount,
        trace: &mut StateTrace<UnwindState>,
    ) -> Result<UnwindOutcome, EngineError> {
        let owner = snapshot.owner().clone();
        let collateral_type = &snapshot.collateral_type;
        let debt_asset = &snapshot.debt_asset;
        let paired_asset = &snapshot.pair.paired_asset;
        let account = &self.settings.account;

        let Collaborators {
            vault,
            lender,
            venues,
            ..
        } = &mut **unit;
        let venue = venues
            .get_mut(&snapshot.pair.swap_venue)
            .ok_or_else(|| EngineError::UnknownVenue(snapshot.pair.swap_venue.clone()))?;
        let lender_id = lender.id();

        let mut residual = Decimal::ZERO;
        let mut debt_repaid = Decimal::ZERO;
        let mut collateral_withdrawn = Decimal::ZERO;
        let flash_fee = lender.flash_loan(account, schedule.flash_amount, &mut |grant: &FlashGrant| {
            if grant.lender != lender_id || grant.initiator != *account {
                return Err(EngineError::UnauthorizedCallback {
                    lender: grant.lender.clone(),
                    initiator: grant.initiator.clone(),
                });
            }
            trace.enter(UnwindState::LiquidityBorrowed);

            let mut cash = grant.amount;
            for step in &schedule.steps {
                if !step.withdraw_amount.is_zero() {
                    vault.withdraw_collateral(&owner, collateral_type, step.withdraw_amount)?;
                    collateral_withdrawn += step.withdraw_amount;
                }
                trace.enter(UnwindState::CollateralWithdrawn);

                trace.enter(UnwindState::Swapping);
                if !step.swap_in_amount.is_zero() {
                    cash += venue.swap(
                        paired_asset,
                        debt_asset,
                        step.swap_in_amount,
                        self.settings.min_out(step.swap_out_amount),
                    )?;
                }

                let repay = step.repay_amount.min(cash);
                if !repay.is_zero() {
                    vault.repay(&owner, collateral_type, repay)?;
                    cash -= repay;
                    debt_repaid += repay;
                }
                trace.enter(UnwindState::VaultRepaid);
            }

            let left = vault.position(&owner, collateral_type);
            if !left.debt_amount.is_zero() {
                return Err(EngineError::SlippageExceeded {
                    minimum: snapshot.position.debt_amount,
                    actual: debt_repaid,
                });
            }
            if !left.collateral_amount.is_zero() {
                return Err(EngineError::InsufficientCollateralToWithdraw {
                    needed: left.collateral_amount,
                    available: Decimal::ZERO,
                });
            }

            let owed = grant.owed();
            if cash < owed {
                return Err(EngineError::LiquidityRepaymentFailed {
                    owed,
                    available: cash,
                });
            }
            residual = cash - owed;
            trace.enter(UnwindState::LiquidityRepaid);
            Ok(owed)
        })?;

        if residual < min_residual {
            return Err(EngineError::SlippageExceeded {
                minimum: min_residual,
                actual: residual,
            });
        }
        trace.enter(UnwindState::ResidualReturned);

        Ok(UnwindOutcome {
            residual,
            flash_fee,
            debt_repaid,
            collateral_withdrawn,
        })
    }
}

struct UnwindOutcome {
    residual: Amount,
    flash_fee: Amount,
    debt_repaid: Amount,
    collateral_withdrawn: Amount,
}
