use gunilev::config::MarketConfig;
use gunilev::engine::WindParams;
use gunilev::types::{EngineError, ErrorClass};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixture::{alice, bob, fixture, fixture_with};

#[test]
fn test_wind_executes_the_quote() {
    let f = fixture();
    let quote = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    let receipt = f
        .engine
        .wind(&alice(), dec!(50000), quote.estimated_remaining_value)
        .unwrap();

    assert_eq!(receipt.remaining, quote.estimated_remaining_value);
    assert_eq!(receipt.iterations, quote.iterations_used);
    assert_eq!(receipt.final_ratio, quote.projected_collateral_ratio);
    assert_eq!(receipt.position.owner, alice());
    assert!(f.market.lender.outstanding().is_zero());
    assert_eq!(f.market.lender.loan_count(), 1);
}

#[test]
fn test_wind_executes_a_caller_bounded_quote() {
    let f = fixture();
    let params = WindParams {
        max_iterations: 5,
        target_leverage: None,
    };
    let quote = f.engine.estimate_wind_with(&alice(), dec!(50000), params).unwrap();
    assert_eq!(quote.iterations_used, 5);
    let receipt = f
        .engine
        .wind_with(&alice(), dec!(50000), quote.estimated_remaining_value, params)
        .unwrap();

    assert_eq!(receipt.iterations, 5);
    assert_eq!(receipt.remaining, quote.estimated_remaining_value);
    assert_eq!(receipt.final_ratio, quote.projected_collateral_ratio);
    // fewer loops leave more of the principal unlevered
    let full = f.engine.estimate_wind(&bob(), dec!(50000)).unwrap();
    assert!(receipt.remaining > full.estimated_remaining_value);
}

#[test]
fn test_wound_position_is_safe() {
    let f = fixture();
    let receipt = f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap();
    let position = f.engine.position(&alice());
    assert_eq!(position.collateral_amount, receipt.position.collateral_amount);
    assert_eq!(position.debt_amount, receipt.position.debt_amount);
    assert!(position.is_safe(dec!(1), dec!(1.05)));
    assert!(position.ratio(dec!(1)).unwrap() >= dec!(1.05));

    let params = f.market.vault.params(&f.market.collateral_type).unwrap();
    assert_eq!(params.total_debt, position.debt_amount);
}

#[test]
fn test_round_trip_realises_the_estimated_cost() {
    let f = fixture();
    let estimated = f.engine.estimate_wind_unwind_cost(&alice(), dec!(50000)).unwrap();

    let wound = f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap();
    let closed = f.engine.unwind(&alice(), Decimal::ZERO).unwrap();
    let realised = dec!(50000) - wound.remaining - closed.residual;

    assert!((realised - estimated).abs() < dec!(0.01), "{realised} vs {estimated}");
    assert!(realised / dec!(50000) <= dec!(0.08));
    assert!(f.engine.position(&alice()).is_empty());
    assert!(f
        .market
        .vault
        .params(&f.market.collateral_type)
        .unwrap()
        .total_debt
        .is_zero());
}

#[test]
fn test_unwind_executes_the_quote() {
    let f = fixture();
    f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap();
    let quote = f.engine.estimate_unwind(&alice()).unwrap();
    let closed = f
        .engine
        .unwind(&alice(), quote.estimated_remaining_value)
        .unwrap();
    assert_eq!(closed.residual, quote.estimated_remaining_value);
    assert_eq!(closed.iterations, quote.iterations_used);
    assert_eq!(closed.states.last().map(String::as_str), Some("Done"));
}

#[test]
fn test_wind_on_top_of_existing_position() {
    let f = fixture();
    f.seed(&bob(), dec!(21000), dec!(10000));
    f.engine.wind(&bob(), dec!(20000), Decimal::ZERO).unwrap();
    let position = f.engine.position(&bob());
    assert!(position.debt_amount > dec!(10000));
    assert!(position.is_safe(dec!(1), dec!(1.05)));

    let closed = f.engine.unwind(&bob(), Decimal::ZERO).unwrap();
    assert!(closed.debt_repaid > dec!(10000));
    assert!(f.engine.position(&bob()).is_empty());
}

#[test]
fn test_ceiling_limits_the_loop() {
    let f = fixture_with(MarketConfig {
        debt_ceiling: dec!(200000),
        ..MarketConfig::default()
    });
    let receipt = f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap();
    assert!(receipt.iterations < 32);
    let total = f
        .market
        .vault
        .params(&f.market.collateral_type)
        .unwrap()
        .total_debt;
    assert!(total <= dec!(200000));
    assert_eq!(total, receipt.position.debt_amount);
}

#[test]
fn test_saturated_ceiling_rejects_wind() {
    let f = fixture_with(MarketConfig {
        total_debt: dec!(10000000),
        ..MarketConfig::default()
    });
    let before = f.baseline(&alice());
    let err = f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap_err();
    assert!(matches!(err, EngineError::CeilingExceeded { .. }), "{err}");
    assert_eq!(f.baseline(&alice()), before);
}

#[test]
fn test_unwind_without_position() {
    let f = fixture();
    let err = f.engine.unwind(&alice(), Decimal::ZERO).unwrap_err();
    assert!(
        matches!(err, EngineError::InsufficientCollateralToWithdraw { .. }),
        "{err}"
    );
    assert_eq!(err.class(), ErrorClass::EconomicLimit);
}

#[test]
fn test_unauthorized_callback_rejected() {
    let f = fixture();
    let before = f.baseline(&alice());
    f.market.lender.set_reported_id("not-the-registered-lender".into());
    let err = f.engine.wind(&alice(), dec!(50000), Decimal::ZERO).unwrap_err();
    assert!(matches!(err, EngineError::UnauthorizedCallback { .. }), "{err}");
    assert_eq!(err.class(), ErrorClass::ExecutionIntegrity);
    assert_eq!(f.baseline(&alice()), before);
}

#[test]
fn test_non_positive_principal_rejected() {
    let f = fixture();
    let err = f.engine.wind(&alice(), dec!(-5), Decimal::ZERO).unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));
}
