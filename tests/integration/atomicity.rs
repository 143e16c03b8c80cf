//! Every failure inside a wind or unwind leaves no partial state behind.

use gunilev::types::{AccountId, EngineError};
use gunilev::venues::{InMemoryMarket, VaultOp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixture::{alice, fixture, Fixture};

fn injected() -> EngineError {
    EngineError::InvalidParameter("injected fault".into())
}

/// Arm a fault on a fresh engine, attempt a wind, and check nothing moved.
fn assert_wind_reverts(label: &str, min_remaining: Decimal, arm: impl Fn(&InMemoryMarket)) {
    let f = fixture();
    let owner = alice();
    let before = f.baseline(&owner);
    arm(&f.market);

    let result = f.engine.wind(&owner, dec!(50000), min_remaining);
    assert!(result.is_err(), "{label}: wind should have failed");
    assert_eq!(f.baseline(&owner), before, "{label}: state leaked");
    assert!(f.market.lender.outstanding().is_zero(), "{label}");
}

/// Wind first, then arm a fault and attempt the unwind.
fn assert_unwind_reverts(label: &str, min_residual: Option<Decimal>, arm: impl Fn(&InMemoryMarket)) {
    let f = wound(&alice());
    let owner = alice();
    let before = f.baseline(&owner);
    let min_residual = min_residual.unwrap_or(Decimal::ZERO);
    arm(&f.market);

    let result = f.engine.unwind(&owner, min_residual);
    assert!(result.is_err(), "{label}: unwind should have failed");
    assert_eq!(f.baseline(&owner), before, "{label}: state leaked");
}

fn wound(owner: &AccountId) -> Fixture {
    let f = fixture();
    f.engine.wind(owner, dec!(50000), Decimal::ZERO).unwrap();
    f
}

#[test]
fn test_wind_vault_faults_revert() {
    for op in [VaultOp::Deposit, VaultOp::Borrow] {
        for nth in [1, 2, 16, 32] {
            assert_wind_reverts(&format!("{op:?} #{nth}"), Decimal::ZERO, |m| {
                m.vault.fail_on(op, nth, injected())
            });
        }
    }
}

#[test]
fn test_wind_swap_faults_revert() {
    for nth in [1, 2, 16, 32] {
        assert_wind_reverts(&format!("swap #{nth}"), Decimal::ZERO, |m| {
            m.pool.fail_on_swap(nth)
        });
    }
}

#[test]
fn test_wind_execution_divergence_reverts() {
    assert_wind_reverts("haircut", Decimal::ZERO, |m| m.pool.set_haircut(dec!(0.02)));
    assert_wind_reverts("extra flash fee", Decimal::ZERO, |m| {
        m.lender.set_extra_fee(dec!(1000000))
    });
    assert_wind_reverts("rogue lender", Decimal::ZERO, |m| {
        m.lender.set_reported_id("rogue".into())
    });
    assert_wind_reverts("remaining bound", dec!(1000000), |_| {});
}

#[test]
fn test_wind_price_drop_between_quote_and_execution() {
    let f = fixture();
    let quote = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    f.market.set_price(dec!(0.99));

    // Re-planned from the live price: still safe at the new spot.
    let receipt = f
        .engine
        .wind(&alice(), dec!(50000), Decimal::ZERO)
        .unwrap();
    assert_ne!(receipt.remaining, quote.estimated_remaining_value);
    assert!(f.engine.position(&alice()).is_safe(dec!(0.99), dec!(1.05)));
}

#[test]
fn test_unwind_vault_faults_revert() {
    for op in [VaultOp::Withdraw, VaultOp::Repay] {
        assert_unwind_reverts(&format!("{op:?} #1"), None, |m| {
            m.vault.fail_on(op, 1, injected())
        });
    }
}

#[test]
fn test_unwind_execution_divergence_reverts() {
    assert_unwind_reverts("swap #1", None, |m| m.pool.fail_on_swap(1));
    assert_unwind_reverts("haircut", None, |m| m.pool.set_haircut(dec!(0.02)));
    assert_unwind_reverts("extra flash fee", None, |m| {
        m.lender.set_extra_fee(dec!(1000000))
    });
    assert_unwind_reverts("rogue lender", None, |m| {
        m.lender.set_reported_id("rogue".into())
    });
    assert_unwind_reverts("residual bound", Some(dec!(1000000)), |_| {});
}

#[test]
fn test_failed_unwind_can_be_retried() {
    let f = wound(&alice());
    f.market.pool.fail_on_swap(1);
    assert!(f.engine.unwind(&alice(), Decimal::ZERO).is_err());

    let closed = f.engine.unwind(&alice(), Decimal::ZERO).unwrap();
    assert!(closed.residual > Decimal::ZERO);
    assert!(f.engine.position(&alice()).is_empty());
}
