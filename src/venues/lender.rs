//! Simulated flash lender.
//!
//! Lends from a fixed pool of liquidity, runs the borrower's callback with
//! the lock released, and requires the principal plus fee back before the
//! call returns. Any failure leaves the lender as it was before the loan.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{flash_fee, lock, FlashGrant, FlashLender, FlashReceiver, Journaled};
use crate::types::{AccountId, Amount, AssetId, EngineError, LenderId, Ratio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Balances {
    liquidity: Amount,
    fees_collected: Amount,
}

#[derive(Debug)]
struct LenderState {
    balances: Balances,
    savepoint: Option<Balances>,
    outstanding: Amount,
    fee_rate: Ratio,
    /// Added on top of the quoted fee when the loan is granted.
    extra_fee: Amount,
    /// Identity presented in grants; differs from `id` for a rogue lender.
    reported_id: Option<LenderId>,
    loans: u64,
}

/// Cloneable handle over a shared lender.
#[derive(Debug, Clone)]
pub struct SimFlashLender {
    id: LenderId,
    asset: AssetId,
    state: Arc<Mutex<LenderState>>,
}

impl SimFlashLender {
    pub fn new(id: LenderId, asset: AssetId, capacity: Amount, fee_rate: Ratio) -> Self {
        Self {
            id,
            asset,
            state: Arc::new(Mutex::new(LenderState {
                balances: Balances {
                    liquidity: capacity,
                    fees_collected: Decimal::ZERO,
                },
                savepoint: None,
                outstanding: Decimal::ZERO,
                fee_rate,
                extra_fee: Decimal::ZERO,
                reported_id: None,
                loans: 0,
            })),
        }
    }

    /// Present `id` in grants instead of the lender's own identity.
    pub fn set_reported_id(&self, id: LenderId) {
        lock(&self.state).reported_id = Some(id);
    }

    /// Charge `extra` on top of the advertised fee.
    pub fn set_extra_fee(&self, extra: Amount) {
        lock(&self.state).extra_fee = extra;
    }

    pub fn liquidity(&self) -> Amount {
        lock(&self.state).balances.liquidity
    }

    pub fn fees_collected(&self) -> Amount {
        lock(&self.state).balances.fees_collected
    }

    pub fn outstanding(&self) -> Amount {
        lock(&self.state).outstanding
    }

    /// Loans granted so far, failed ones included.
    pub fn loan_count(&self) -> u64 {
        lock(&self.state).loans
    }

    fn settle_failed(&self, amount: Amount) {
        let mut state = lock(&self.state);
        state.balances.liquidity += amount;
        state.outstanding = Decimal::ZERO;
    }
}

impl Journaled for SimFlashLender {
    fn begin(&mut self) {
        let mut state = lock(&self.state);
        state.savepoint = Some(state.balances);
    }

    fn commit(&mut self) {
        lock(&self.state).savepoint = None;
    }

    fn rollback(&mut self) {
        let mut state = lock(&self.state);
        if let Some(saved) = state.savepoint.take() {
            state.balances = saved;
            state.outstanding = Decimal::ZERO;
        }
    }
}

impl FlashLender for SimFlashLender {
    fn id(&self) -> LenderId {
        self.id.clone()
    }

    fn max_flash_loan(&self) -> Amount {
        lock(&self.state).balances.liquidity
    }

    fn fee_rate(&self) -> Ratio {
        lock(&self.state).fee_rate
    }

    fn flash_loan(
        &mut self,
        initiator: &AccountId,
        amount: Amount,
        receiver: &mut FlashReceiver<'_>,
    ) -> Result<Amount, EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "flash amount must not be negative, got {amount}"
            )));
        }

        let grant = {
            let mut state = lock(&self.state);
            if amount > state.balances.liquidity {
                return Err(EngineError::InsufficientFunds {
                    needed: amount,
                    available: state.balances.liquidity,
                });
            }
            state.balances.liquidity -= amount;
            state.outstanding = amount;
            state.loans += 1;
            FlashGrant {
                lender: state.reported_id.clone().unwrap_or_else(|| self.id.clone()),
                initiator: initiator.clone(),
                asset: self.asset.clone(),
                amount,
                fee: flash_fee(amount, state.fee_rate) + state.extra_fee,
            }
        };
        debug!(lender = %self.id, amount = %amount, fee = %grant.fee, "Flash loan granted");

        let repaid = match receiver(&grant) {
            Ok(repaid) => repaid,
            Err(e) => {
                self.settle_failed(amount);
                return Err(e);
            }
        };

        let owed = grant.owed();
        if repaid < owed {
            warn!(lender = %self.id, owed = %owed, repaid = %repaid, "Flash loan not repaid");
            self.settle_failed(amount);
            return Err(EngineError::LiquidityRepaymentFailed {
                owed,
                available: repaid,
            });
        }

        let mut state = lock(&self.state);
        state.balances.liquidity += amount;
        state.balances.fees_collected += grant.fee;
        state.outstanding = Decimal::ZERO;
        Ok(grant.fee)
    }
}
