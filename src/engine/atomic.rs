//! Atomic unit of work over the collaborators.
//!
//! `AtomicUnit::begin` opens a savepoint on every stateful collaborator.
//! Dropping the unit without `commit` rolls every one of them back, so an
//! early return through `?` anywhere in a controller leaves the vault,
//! the venues and the lender exactly as they were.

use rust_decimal::Decimal;
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

use super::planner::PlannerParams;
use crate::config::EngineConfig;
use crate::types::{floor_amount, AccountId, Amount, Ratio};
use crate::venues::{Collaborators, Journaled};

pub struct AtomicUnit<'a> {
    collaborators: &'a mut Collaborators,
    committed: bool,
}

impl<'a> AtomicUnit<'a> {
    pub fn begin(collaborators: &'a mut Collaborators) -> Self {
        collaborators.begin();
        Self {
            collaborators,
            committed: false,
        }
    }

    pub fn commit(mut self) {
        self.collaborators.commit();
        self.committed = true;
    }
}

impl Deref for AtomicUnit<'_> {
    type Target = Collaborators;

    fn deref(&self) -> &Collaborators {
        self.collaborators
    }
}

impl DerefMut for AtomicUnit<'_> {
    fn deref_mut(&mut self) -> &mut Collaborators {
        self.collaborators
    }
}

impl Drop for AtomicUnit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.collaborators.rollback();
            debug!("Atomic unit rolled back");
        }
    }
}

// ---------------------------------------------------------------------------
// State trace
// ---------------------------------------------------------------------------

/// Ordered record of the states a controller passed through.
#[derive(Debug, Clone)]
pub struct StateTrace<S> {
    operation: &'static str,
    initial: S,
    states: Vec<S>,
}

impl<S: Copy + fmt::Display> StateTrace<S> {
    pub fn new(operation: &'static str, initial: S) -> Self {
        debug!(operation, state = %initial, "State");
        Self {
            operation,
            initial,
            states: vec![initial],
        }
    }

    pub fn enter(&mut self, state: S) {
        debug!(operation = self.operation, state = %state, "State");
        self.states.push(state);
    }

    pub fn current(&self) -> S {
        self.states.last().copied().unwrap_or(self.initial)
    }

    /// Record the absorbing failure state, logging where execution stopped.
    pub fn revert(&mut self, failed: S, error: &dyn fmt::Display) {
        warn!(
            operation = self.operation,
            last_state = %self.current(),
            error = %error,
            "Unit reverted"
        );
        self.states.push(failed);
    }

    pub fn names(&self) -> Vec<String> {
        self.states.iter().map(ToString::to_string).collect()
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }
}

// ---------------------------------------------------------------------------
// Controller settings
// ---------------------------------------------------------------------------

/// What both controllers need besides the registry.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Account the engine acts as; must be the initiator of every flash grant.
    pub account: AccountId,
    pub slippage_tolerance: Ratio,
    pub planner: PlannerParams,
}

impl ControllerSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            account: config.account_id(),
            slippage_tolerance: config.slippage_tolerance,
            planner: PlannerParams::from_config(config),
        }
    }

    /// Least acceptable output for a swap planned to yield `planned`.
    pub fn min_out(&self, planned: Amount) -> Amount {
        floor_amount(planned * (Decimal::ONE - self.slippage_tolerance))
    }
}
