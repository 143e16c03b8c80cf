//! Wind controller.
//!
//! `Idle → LiquidityBorrowed → {Swapping → CollateralDeposited → VaultBorrowed}×k
//! → LiquidityRepaid → Verified → Done`, or `Reverted` from anywhere before
//! `Done`. The whole path runs inside one `AtomicUnit`.

use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::atomic::{AtomicUnit, ControllerSettings, StateTrace};
use super::planner::{plan_wind, MarketSnapshot, WindParams};
use super::registry::PairRegistry;
use crate::types::{
    AccountId, Amount, CollateralType, EngineError, LeverageSchedule, PositionHandle, WindReceipt,
};
use crate::venues::{Collaborators, FlashGrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindState {
    Idle,
    LiquidityBorrowed,
    Swapping,
    CollateralDeposited,
    VaultBorrowed,
    LiquidityRepaid,
    Verified,
    Done,
    Reverted,
}

impl fmt::Display for WindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindState::Idle => "Idle",
            WindState::LiquidityBorrowed => "LiquidityBorrowed",
            WindState::Swapping => "Swapping",
            WindState::CollateralDeposited => "CollateralDeposited",
            WindState::VaultBorrowed => "VaultBorrowed",
            WindState::LiquidityRepaid => "LiquidityRepaid",
            WindState::Verified => "Verified",
            WindState::Done => "Done",
            WindState::Reverted => "Reverted",
        };
        f.write_str(s)
    }
}

/// Opens or grows a leveraged position atomically.
#[derive(Debug)]
pub struct WindController {
    registry: Arc<PairRegistry>,
    settings: ControllerSettings,
}

impl WindController {
    pub fn new(registry: Arc<PairRegistry>, settings: ControllerSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Wind `principal` into `owner`'s position.
    ///
    /// Re-plans from live state, executes the plan under a flash loan, and
    /// commits only if the final ratio is safe and at least
    /// `min_remaining` comes back to the owner.
    pub fn wind(
        &self,
        collaborators: &mut Collaborators,
        collateral_type: &CollateralType,
        owner: &AccountId,
        principal: Amount,
        min_remaining: Amount,
        params: &WindParams,
    ) -> Result<WindReceipt, EngineError> {
        if principal <= Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "wind principal must be positive, got {principal}"
            )));
        }
        let pair = self.registry.pair_config(collateral_type)?;
        let snapshot = MarketSnapshot::capture(collaborators, collateral_type, &pair, owner)?;
        let plan = plan_wind(&snapshot, principal, &self.settings.planner, params)?;
        if plan.schedule.steps.is_empty() {
            return Err(EngineError::InvalidParameter(format!(
                "principal {principal} is below the dust threshold"
            )));
        }

        let mut trace = StateTrace::new("wind", WindState::Idle);
        let mut unit = AtomicUnit::begin(collaborators);
        match self.execute(&mut unit, &snapshot, &plan.schedule, min_remaining, &mut trace) {
            Ok(outcome) => {
                unit.commit();
                trace.enter(WindState::Done);
                info!(
                    owner = %owner,
                    collateral_type = %collateral_type,
                    iterations = plan.schedule.iterations(),
                    remaining = %outcome.remaining,
                    ratio = %outcome.final_ratio,
                    "Wind committed"
                );
                Ok(WindReceipt {
                    position: PositionHandle {
                        id: Uuid::new_v4(),
                        owner: owner.clone(),
                        collateral_type: collateral_type.clone(),
                        collateral_amount: outcome.collateral,
                        debt_amount: outcome.debt,
                        opened_at: Utc::now(),
                    },
                    iterations: plan.schedule.iterations(),
                    flash_amount: plan.schedule.flash_amount,
                    flash_fee: outcome.flash_fee,
                    remaining: outcome.remaining,
                    final_ratio: outcome.final_ratio,
                    states: trace.names(),
                })
            }
            Err(e) => {
                trace.revert(WindState::Reverted, &e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        unit: &mut AtomicUnit<'_>,
        snapshot: &MarketSnapshot,
        schedule: &LeverageSchedule,
        min_remaining: Amount,
        trace: &mut StateTrace<WindState>,
    ) -> Result<WindOutcome, EngineError> {
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
        let adapter = snapshot.adapter.clone();
        let lender_id = lender.id();

        let mut remaining = Decimal::ZERO;
        let flash_fee = lender.flash_loan(account, schedule.flash_amount, &mut |grant: &FlashGrant| {
            if grant.lender != lender_id || grant.initiator != *account {
                return Err(EngineError::UnauthorizedCallback {
                    lender: grant.lender.clone(),
                    initiator: grant.initiator.clone(),
                });
            }
            trace.enter(WindState::LiquidityBorrowed);

            // principal plus the flash loan, drawn down by swaps and refilled by borrows
            let mut cash = schedule.principal + grant.amount;
            for step in &schedule.steps {
                trace.enter(WindState::Swapping);
                if cash < step.swap_in_amount {
                    return Err(EngineError::InsufficientFunds {
                        needed: step.swap_in_amount,
                        available: cash,
                    });
                }
                cash -= step.swap_in_amount;
                let swapped = venue.swap(
                    debt_asset,
                    paired_asset,
                    step.swap_in_amount,
                    self.settings.min_out(step.swap_out_amount),
                )?;

                let deposit = adapter.join(swapped);
                vault.deposit_collateral(&owner, collateral_type, deposit)?;
                trace.enter(WindState::CollateralDeposited);

                vault.borrow(&owner, collateral_type, step.borrow_amount)?;
                cash += step.borrow_amount;
                trace.enter(WindState::VaultBorrowed);
            }

            let owed = grant.owed();
            if cash < owed {
                return Err(EngineError::LiquidityRepaymentFailed {
                    owed,
                    available: cash,
                });
            }
            remaining = cash - owed;
            trace.enter(WindState::LiquidityRepaid);
            Ok(owed)
        })?;

        let required = vault.liquidation_ratio(collateral_type)?;
        let final_ratio = vault
            .current_ratio(&owner, collateral_type)?
            .unwrap_or(Decimal::ZERO);
        if final_ratio < required {
            return Err(EngineError::Undercollateralized {
                ratio: final_ratio,
                required,
            });
        }
        if remaining < min_remaining {
            return Err(EngineError::SlippageExceeded {
                minimum: min_remaining,
                actual: remaining,
            });
        }
        trace.enter(WindState::Verified);

        let position = vault.position(&owner, collateral_type);
        Ok(WindOutcome {
            remaining,
            flash_fee,
            final_ratio,
            collateral: position.collateral_amount,
            debt: position.debt_amount,
        })
    }
}

struct WindOutcome {
    remaining: Amount,
    flash_fee: Amount,
    final_ratio: Decimal,
    collateral: Amount,
    debt: Amount,
}
