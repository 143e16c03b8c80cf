//! In-memory vault ledger.
//!
//! Tracks per-owner collateral and debt per collateral type, enforces the
//! debt ceiling on every borrow and the liquidation ratio on every borrow
//! and withdrawal. Faults can be armed per operation so tests can break a
//! unit of work at any step.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{lock, Journaled, VaultLedger};
use crate::types::{AccountId, Amount, AssetId, CollateralType, EngineError, Position, Price, Ratio};

/// Risk parameters and running totals of one collateral type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlkParams {
    /// Price the vault uses for safety checks.
    pub spot: Price,
    pub liquidation_ratio: Ratio,
    pub debt_ceiling: Amount,
    pub total_debt: Amount,
}

/// Mutating vault operations, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaultOp {
    Deposit,
    Withdraw,
    Borrow,
    Repay,
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    ilks: HashMap<CollateralType, IlkParams>,
    positions: HashMap<(AccountId, CollateralType), Position>,
}

#[derive(Debug)]
struct ArmedFault {
    op: VaultOp,
    /// Calls of `op` still allowed to succeed.
    remaining: usize,
    error: EngineError,
}

#[derive(Debug)]
struct VaultState {
    debt_asset: AssetId,
    ledger: Ledger,
    savepoint: Option<Ledger>,
    fault: Option<ArmedFault>,
}

/// Cloneable handle over one shared ledger.
#[derive(Debug, Clone)]
pub struct InMemoryVault {
    state: Arc<Mutex<VaultState>>,
}

impl InMemoryVault {
    pub fn new(debt_asset: AssetId) -> Self {
        Self {
            state: Arc::new(Mutex::new(VaultState {
                debt_asset,
                ledger: Ledger::default(),
                savepoint: None,
                fault: None,
            })),
        }
    }

    pub fn add_collateral_type(&self, collateral_type: CollateralType, params: IlkParams) {
        lock(&self.state).ledger.ilks.insert(collateral_type, params);
    }

    /// Update the spot price (spotter poke).
    pub fn poke(&self, collateral_type: &CollateralType, spot: Price) {
        if let Some(ilk) = lock(&self.state).ledger.ilks.get_mut(collateral_type) {
            ilk.spot = spot;
        }
    }

    /// Overwrite the debt ceiling.
    pub fn set_debt_ceiling(&self, collateral_type: &CollateralType, ceiling: Amount) {
        if let Some(ilk) = lock(&self.state).ledger.ilks.get_mut(collateral_type) {
            ilk.debt_ceiling = ceiling;
        }
    }

    pub fn params(&self, collateral_type: &CollateralType) -> Option<IlkParams> {
        lock(&self.state).ledger.ilks.get(collateral_type).cloned()
    }

    /// Seed a position directly, bypassing the safety checks but still
    /// counting its debt toward the collateral type's total.
    pub fn seed_position(
        &self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        collateral: Amount,
        debt: Amount,
    ) {
        let mut state = lock(&self.state);
        if let Some(ilk) = state.ledger.ilks.get_mut(collateral_type) {
            ilk.total_debt += debt;
        }
        let position = state
            .ledger
            .positions
            .entry((owner.clone(), collateral_type.clone()))
            .or_insert_with(|| Position::empty(owner.clone(), collateral_type.clone()));
        position.collateral_amount += collateral;
        position.debt_amount += debt;
    }

    /// Fail the `nth` (1-based) call of `op` from now on with `error`.
    pub fn fail_on(&self, op: VaultOp, nth: usize, error: EngineError) {
        lock(&self.state).fault = Some(ArmedFault {
            op,
            remaining: nth.saturating_sub(1),
            error,
        });
    }
}

impl VaultState {
    fn check_fault(&mut self, op: VaultOp) -> Result<(), EngineError> {
        let Some(fault) = self.fault.as_mut() else {
            return Ok(());
        };
        if fault.op != op {
            return Ok(());
        }
        if fault.remaining == 0 {
            let error = fault.error.clone();
            self.fault = None;
            debug!(?op, %error, "Injected vault fault");
            return Err(error);
        }
        fault.remaining -= 1;
        Ok(())
    }

    fn ilk(&self, collateral_type: &CollateralType) -> Result<&IlkParams, EngineError> {
        self.ledger
            .ilks
            .get(collateral_type)
            .ok_or_else(|| EngineError::UnknownCollateralType(collateral_type.clone()))
    }

    fn position_mut(&mut self, owner: &AccountId, collateral_type: &CollateralType) -> &mut Position {
        self.ledger
            .positions
            .entry((owner.clone(), collateral_type.clone()))
            .or_insert_with(|| Position::empty(owner.clone(), collateral_type.clone()))
    }

    fn require_safe(
        ilk: &IlkParams,
        collateral: Amount,
        debt: Amount,
    ) -> Result<(), EngineError> {
        if debt.is_zero() || collateral * ilk.spot >= debt * ilk.liquidation_ratio {
            return Ok(());
        }
        Err(EngineError::Undercollateralized {
            ratio: collateral * ilk.spot / debt,
            required: ilk.liquidation_ratio,
        })
    }
}

fn require_positive(amount: Amount, what: &str) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "{what} amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

impl Journaled for InMemoryVault {
    fn begin(&mut self) {
        let mut state = lock(&self.state);
        state.savepoint = Some(state.ledger.clone());
    }

    fn commit(&mut self) {
        lock(&self.state).savepoint = None;
    }

    fn rollback(&mut self) {
        let mut state = lock(&self.state);
        if let Some(saved) = state.savepoint.take() {
            state.ledger = saved;
        }
    }
}

impl VaultLedger for InMemoryVault {
    fn debt_asset(&self) -> AssetId {
        lock(&self.state).debt_asset.clone()
    }

    fn liquidation_ratio(&self, collateral_type: &CollateralType) -> Result<Ratio, EngineError> {
        lock(&self.state).ilk(collateral_type).map(|i| i.liquidation_ratio)
    }

    fn debt_ceiling(&self, collateral_type: &CollateralType) -> Result<Amount, EngineError> {
        lock(&self.state).ilk(collateral_type).map(|i| i.debt_ceiling)
    }

    fn total_debt(&self, collateral_type: &CollateralType) -> Result<Amount, EngineError> {
        lock(&self.state).ilk(collateral_type).map(|i| i.total_debt)
    }

    fn position(&self, owner: &AccountId, collateral_type: &CollateralType) -> Position {
        lock(&self.state)
            .ledger
            .positions
            .get(&(owner.clone(), collateral_type.clone()))
            .cloned()
            .unwrap_or_else(|| Position::empty(owner.clone(), collateral_type.clone()))
    }

    fn current_ratio(
        &self,
        owner: &AccountId,
        collateral_type: &CollateralType,
    ) -> Result<Option<Ratio>, EngineError> {
        let spot = lock(&self.state).ilk(collateral_type)?.spot;
        Ok(self.position(owner, collateral_type).ratio(spot))
    }

    fn deposit_collateral(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError> {
        require_positive(amount, "deposit")?;
        let mut state = lock(&self.state);
        state.check_fault(VaultOp::Deposit)?;
        state.ilk(collateral_type)?;
        state.position_mut(owner, collateral_type).collateral_amount += amount;
        Ok(())
    }

    fn withdraw_collateral(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError> {
        require_positive(amount, "withdraw")?;
        let mut state = lock(&self.state);
        state.check_fault(VaultOp::Withdraw)?;
        let ilk = state.ilk(collateral_type)?.clone();
        let position = state.position_mut(owner, collateral_type);
        if position.collateral_amount < amount {
            return Err(EngineError::InsufficientCollateralToWithdraw {
                needed: amount,
                available: position.collateral_amount,
            });
        }
        let collateral_after = position.collateral_amount - amount;
        VaultState::require_safe(&ilk, collateral_after, position.debt_amount)?;
        position.collateral_amount = collateral_after;
        Ok(())
    }

    fn borrow(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError> {
        require_positive(amount, "borrow")?;
        let mut state = lock(&self.state);
        state.check_fault(VaultOp::Borrow)?;
        let ilk = state.ilk(collateral_type)?.clone();
        let requested = ilk.total_debt + amount;
        if requested > ilk.debt_ceiling {
            return Err(EngineError::CeilingExceeded {
                collateral_type: collateral_type.clone(),
                ceiling: ilk.debt_ceiling,
                requested,
            });
        }
        let position = state.position_mut(owner, collateral_type);
        let debt_after = position.debt_amount + amount;
        VaultState::require_safe(&ilk, position.collateral_amount, debt_after)?;
        position.debt_amount = debt_after;
        if let Some(ilk) = state.ledger.ilks.get_mut(collateral_type) {
            ilk.total_debt = requested;
        }
        Ok(())
    }

    fn repay(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError> {
        require_positive(amount, "repay")?;
        let mut state = lock(&self.state);
        state.check_fault(VaultOp::Repay)?;
        state.ilk(collateral_type)?;
        let position = state.position_mut(owner, collateral_type);
        if amount > position.debt_amount {
            return Err(EngineError::InvalidParameter(format!(
                "repay {amount} exceeds debt {}",
                position.debt_amount
            )));
        }
        position.debt_amount -= amount;
        if let Some(ilk) = state.ledger.ilks.get_mut(collateral_type) {
            ilk.total_debt -= amount;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
