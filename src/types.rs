//! Shared types for the GUNILEV engine.
//!
//! These types form the data model used across all modules. Amounts,
//! ratios and prices are `Decimal` throughout; nothing in the engine
//! touches floating point.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token amount, denominated in whole units of the asset.
pub type Amount = Decimal;
/// Dimensionless ratio (collateralization, loan-to-value, fee rate).
pub type Ratio = Decimal;
/// Price of one collateral unit in debt-asset units.
pub type Price = Decimal;

/// Decimal places kept on every amount the engine computes (wei precision).
pub const AMOUNT_DP: u32 = 18;

/// Smallest representable amount at `AMOUNT_DP`.
pub fn amount_epsilon() -> Amount {
    Decimal::new(1, AMOUNT_DP)
}

/// Truncate an amount to `AMOUNT_DP` places, rounding toward zero.
pub fn floor_amount(value: Decimal) -> Amount {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToZero)
}

/// Round an amount up to `AMOUNT_DP` places.
pub fn ceil_amount(value: Decimal) -> Amount {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::AwayFromZero)
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Collateral class accepted by the vault ledger (e.g. `GUNIV3DAIUSDC1-A`).
    CollateralType
);
string_id!(
    /// Asset identifier (token symbol or address).
    AssetId
);
string_id!(
    /// Account identifier: position owners, the administrator, the engine itself.
    AccountId
);
string_id!(
    /// Reference to a collateral adapter (join).
    AdapterId
);
string_id!(
    /// Reference to a swap venue (pool or router).
    VenueId
);
string_id!(
    /// Reference to a flash lender.
    LenderId
);

// ---------------------------------------------------------------------------
// Pair configuration
// ---------------------------------------------------------------------------

/// Configuration tuple registered per collateral type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    pub collateral_adapter: AdapterId,
    pub paired_asset: AssetId,
    pub swap_venue: VenueId,
}

impl PairConfig {
    pub fn new(
        collateral_adapter: impl Into<String>,
        paired_asset: impl Into<String>,
        swap_venue: impl Into<String>,
    ) -> Self {
        Self {
            collateral_adapter: AdapterId::new(collateral_adapter),
            paired_asset: AssetId::new(paired_asset),
            swap_venue: VenueId::new(swap_venue),
        }
    }
}

impl fmt::Display for PairConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adapter={} paired={} venue={}",
            self.collateral_adapter, self.paired_asset, self.swap_venue
        )
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A vault position as tracked by the external ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub owner: AccountId,
    pub collateral_type: CollateralType,
    /// Collateral units locked in the vault.
    pub collateral_amount: Amount,
    /// Debt-asset units owed to the vault.
    pub debt_amount: Amount,
}

impl Position {
    pub fn empty(owner: AccountId, collateral_type: CollateralType) -> Self {
        Self {
            owner,
            collateral_type,
            collateral_amount: Decimal::ZERO,
            debt_amount: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collateral_amount.is_zero() && self.debt_amount.is_zero()
    }

    /// Collateral value in debt-asset units at `price`.
    pub fn collateral_value(&self, price: Price) -> Amount {
        self.collateral_amount * price
    }

    /// Collateral value / debt. `None` when there is no debt.
    pub fn ratio(&self, price: Price) -> Option<Ratio> {
        if self.debt_amount.is_zero() {
            None
        } else {
            Some(self.collateral_value(price) / self.debt_amount)
        }
    }

    /// Whether `collateral value >= debt * liquidation_ratio`.
    pub fn is_safe(&self, price: Price, liquidation_ratio: Ratio) -> bool {
        self.collateral_value(price) >= self.debt_amount * liquidation_ratio
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} collateral={:.4} debt={:.4}",
            self.owner, self.collateral_type, self.collateral_amount, self.debt_amount
        )
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// Why schedule generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// No steps requested or nothing to do.
    Empty,
    /// Next tranche fell below the dust threshold.
    Dust,
    /// `max_iterations` reached.
    IterationLimit,
    /// Target leverage reached.
    TargetReached,
    /// Global debt ceiling left no headroom for another borrow.
    Ceiling,
    /// Swap venue quoted zero output.
    NoLiquidity,
    /// Flash lender cannot fund another tranche.
    FlashCapacity,
    /// Position fully closed (unwind).
    Closed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Empty => "empty",
            StopReason::Dust => "dust",
            StopReason::IterationLimit => "iteration-limit",
            StopReason::TargetReached => "target-reached",
            StopReason::Ceiling => "ceiling",
            StopReason::NoLiquidity => "no-liquidity",
            StopReason::FlashCapacity => "flash-capacity",
            StopReason::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One borrow → swap → deposit step of a wind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageStep {
    pub index: u32,
    /// Debt asset borrowed from the vault at the end of this step.
    pub borrow_amount: Amount,
    /// Debt asset swapped into the paired asset.
    pub swap_in_amount: Amount,
    /// Paired asset received from the swap.
    pub swap_out_amount: Amount,
    /// Collateral units deposited (after the adapter join).
    pub deposit_amount: Amount,
    /// Debt added by this wind so far, including this step.
    pub cumulative_debt: Amount,
    /// Collateral value added by this wind so far, including this step.
    pub cumulative_collateral_value: Amount,
}

/// Ordered wind plan. Ephemeral: produced and consumed within one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageSchedule {
    pub principal: Amount,
    /// Principal held back to pay the flash fee.
    pub reserve: Amount,
    pub steps: Vec<LeverageStep>,
    /// Transient liquidity needed to fund tranches after the principal.
    pub flash_amount: Amount,
    pub flash_fee: Amount,
    /// Debt asset handed back to the owner after repaying the flash loan.
    pub remaining: Amount,
    pub stop: StopReason,
}

impl LeverageSchedule {
    pub fn empty(principal: Amount) -> Self {
        Self {
            principal,
            reserve: Decimal::ZERO,
            steps: Vec::new(),
            flash_amount: Decimal::ZERO,
            flash_fee: Decimal::ZERO,
            remaining: principal,
            stop: StopReason::Empty,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn total_borrowed(&self) -> Amount {
        self.steps.last().map(|s| s.cumulative_debt).unwrap_or(Decimal::ZERO)
    }

    pub fn total_collateral(&self) -> Amount {
        self.steps.iter().map(|s| s.deposit_amount).sum()
    }

    pub fn total_collateral_value(&self) -> Amount {
        self.steps
            .last()
            .map(|s| s.cumulative_collateral_value)
            .unwrap_or(Decimal::ZERO)
    }
}

/// One withdraw → swap → repay step of an unwind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwindStep {
    pub index: u32,
    /// Collateral units withdrawn from the vault.
    pub withdraw_amount: Amount,
    /// Paired asset released by the adapter and swapped.
    pub swap_in_amount: Amount,
    /// Debt asset received from the swap.
    pub swap_out_amount: Amount,
    /// Debt repaid to the vault.
    pub repay_amount: Amount,
    pub debt_after: Amount,
    pub collateral_after: Amount,
}

/// Ordered unwind plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwindSchedule {
    pub steps: Vec<UnwindStep>,
    pub flash_amount: Amount,
    pub flash_fee: Amount,
    /// Value returned to the owner after all debt and the flash loan are repaid.
    pub residual: Amount,
    pub stop: StopReason,
}

impl UnwindSchedule {
    pub fn empty() -> Self {
        Self {
            steps: Vec::new(),
            flash_amount: Decimal::ZERO,
            flash_fee: Decimal::ZERO,
            residual: Decimal::ZERO,
            stop: StopReason::Empty,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.steps.len() as u32
    }
}

// ---------------------------------------------------------------------------
// Estimates and receipts
// ---------------------------------------------------------------------------

/// Quote returned by the estimation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateResult {
    /// Value lost to slippage and fees.
    pub estimated_cost: Amount,
    /// Value handed back to the owner by the quoted operation.
    pub estimated_remaining_value: Amount,
    pub iterations_used: u32,
    /// Collateral value / debt after the final step (zero when closed).
    pub projected_collateral_ratio: Ratio,
}

impl EstimateResult {
    pub fn zero() -> Self {
        Self {
            estimated_cost: Decimal::ZERO,
            estimated_remaining_value: Decimal::ZERO,
            iterations_used: 0,
            projected_collateral_ratio: Decimal::ZERO,
        }
    }

    /// Cost as a fraction of `principal` (zero for zero principal).
    pub fn relative_cost(&self, principal: Amount) -> Ratio {
        if principal.is_zero() {
            Decimal::ZERO
        } else {
            self.estimated_cost / principal
        }
    }
}

impl fmt::Display for EstimateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cost={:.4} remaining={:.4} iterations={} ratio={:.4}",
            self.estimated_cost,
            self.estimated_remaining_value,
            self.iterations_used,
            self.projected_collateral_ratio,
        )
    }
}

/// Handle to a leveraged position opened by a successful wind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHandle {
    pub id: Uuid,
    pub owner: AccountId,
    pub collateral_type: CollateralType,
    pub collateral_amount: Amount,
    pub debt_amount: Amount,
    pub opened_at: DateTime<Utc>,
}

impl fmt::Display for PositionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}@{} collateral={:.4} debt={:.4}",
            self.id, self.owner, self.collateral_type, self.collateral_amount, self.debt_amount
        )
    }
}

/// Outcome of a committed wind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindReceipt {
    pub position: PositionHandle,
    pub iterations: u32,
    pub flash_amount: Amount,
    pub flash_fee: Amount,
    /// Debt asset returned to the owner.
    pub remaining: Amount,
    pub final_ratio: Ratio,
    /// State machine path taken, in order.
    pub states: Vec<String>,
}

/// Outcome of a committed unwind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwindReceipt {
    pub id: Uuid,
    pub owner: AccountId,
    pub collateral_type: CollateralType,
    pub iterations: u32,
    pub debt_repaid: Amount,
    pub collateral_withdrawn: Amount,
    pub flash_amount: Amount,
    pub flash_fee: Amount,
    /// Value transferred to the owner.
    pub residual: Amount,
    pub closed_at: DateTime<Utc>,
    pub states: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error taxonomy used to decide how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Caller mistake; surfaced immediately, never retried.
    Configuration,
    /// Real external constraint at call time; caller may retry with new parameters.
    EconomicLimit,
    /// Live execution diverged or a collaborator misbehaved; unit reverted.
    ExecutionIntegrity,
}

/// Domain errors for the engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown collateral type: {0}")]
    UnknownCollateralType(CollateralType),

    #[error("Unauthorized: {0} may not perform this action")]
    Unauthorized(AccountId),

    #[error("Debt ceiling exceeded for {collateral_type}: ceiling {ceiling}, requested total {requested}")]
    CeilingExceeded {
        collateral_type: CollateralType,
        ceiling: Amount,
        requested: Amount,
    },

    #[error("Undercollateralized: ratio {ratio} below required {required}")]
    Undercollateralized { ratio: Ratio, required: Ratio },

    #[error("Insufficient collateral to withdraw: need {needed}, have {available}")]
    InsufficientCollateralToWithdraw { needed: Amount, available: Amount },

    #[error("Slippage exceeded: expected at least {minimum}, got {actual}")]
    SlippageExceeded { minimum: Amount, actual: Amount },

    #[error("Transient liquidity repayment failed: owed {owed}, available {available}")]
    LiquidityRepaymentFailed { owed: Amount, available: Amount },

    #[error("Unauthorized flash callback from lender {lender} (initiator {initiator})")]
    UnauthorizedCallback { lender: LenderId, initiator: AccountId },

    #[error("Iteration limit of {0} reached before the position closed")]
    IterationLimitReached(u32),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Controllers are not bound")]
    ControllersNotBound,

    #[error("Unknown swap venue: {0}")]
    UnknownVenue(VenueId),

    #[error("Unknown collateral adapter: {0}")]
    UnknownAdapter(AdapterId),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A worker running engine code panicked or was cancelled.
    #[error("Engine task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::UnknownCollateralType(_)
            | EngineError::Unauthorized(_)
            | EngineError::ControllersNotBound
            | EngineError::UnknownVenue(_)
            | EngineError::UnknownAdapter(_)
            | EngineError::InvalidParameter(_) => ErrorClass::Configuration,
            EngineError::CeilingExceeded { .. }
            | EngineError::Undercollateralized { .. }
            | EngineError::InsufficientCollateralToWithdraw { .. }
            | EngineError::IterationLimitReached(_)
            | EngineError::InsufficientFunds { .. } => ErrorClass::EconomicLimit,
            EngineError::SlippageExceeded { .. }
            | EngineError::LiquidityRepaymentFailed { .. }
            | EngineError::UnauthorizedCallback { .. }
            | EngineError::TaskFailed(_) => ErrorClass::ExecutionIntegrity,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(collateral: Amount, debt: Amount) -> Position {
        Position {
            owner: AccountId::from("alice"),
            collateral_type: CollateralType::from("GUNIV3DAIUSDC1-A"),
            collateral_amount: collateral,
            debt_amount: debt,
        }
    }

    #[test]
    fn test_floor_and_ceil_amount() {
        let x = dec!(1.0000000000000000005);
        assert_eq!(floor_amount(x), dec!(1));
        assert_eq!(ceil_amount(x), dec!(1.000000000000000001));
        assert_eq!(amount_epsilon(), dec!(0.000000000000000001));
    }

    #[test]
    fn test_position_ratio() {
        let p = position(dec!(110), dec!(100));
        assert_eq!(p.ratio(dec!(1)), Some(dec!(1.1)));
        assert!(p.is_safe(dec!(1), dec!(1.05)));
        assert!(!p.is_safe(dec!(0.9), dec!(1.05)));
    }

    #[test]
    fn test_position_without_debt_has_no_ratio() {
        let p = position(dec!(10), Decimal::ZERO);
        assert_eq!(p.ratio(dec!(1)), None);
        assert!(!p.is_empty());
        assert!(Position::empty(p.owner.clone(), p.collateral_type.clone()).is_empty());
    }

    #[test]
    fn test_empty_schedule_returns_principal() {
        let s = LeverageSchedule::empty(dec!(5));
        assert_eq!(s.remaining, dec!(5));
        assert_eq!(s.iterations(), 0);
        assert_eq!(s.total_borrowed(), Decimal::ZERO);
    }

    #[test]
    fn test_relative_cost() {
        let e = EstimateResult {
            estimated_cost: dec!(400),
            estimated_remaining_value: dec!(49600),
            iterations_used: 3,
            projected_collateral_ratio: dec!(1.1),
        };
        assert_eq!(e.relative_cost(dec!(50000)), dec!(0.008));
        assert_eq!(EstimateResult::zero().relative_cost(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            EngineError::UnknownCollateralType("X".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            EngineError::Undercollateralized { ratio: dec!(1), required: dec!(1.05) }.class(),
            ErrorClass::EconomicLimit
        );
        assert_eq!(
            EngineError::UnauthorizedCallback {
                lender: "rogue".into(),
                initiator: "gunilev".into()
            }
            .class(),
            ErrorClass::ExecutionIntegrity
        );
        assert_eq!(
            EngineError::TaskFailed("task 7 panicked".into()).class(),
            ErrorClass::ExecutionIntegrity
        );
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::UnknownCollateralType(CollateralType::from("ETH-A"));
        assert_eq!(err.to_string(), "Unknown collateral type: ETH-A");
    }

    #[test]
    fn test_id_serialization_is_transparent() {
        let id = CollateralType::from("GUNIV3DAIUSDC1-A");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"GUNIV3DAIUSDC1-A\"");
    }
}
