use gunilev::config::MarketConfig;
use gunilev::engine::WindParams;
use gunilev::pricing::CurveKind;
use gunilev::types::{EngineError, ErrorClass, EstimateResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixture::{alice, bob, fixture, fixture_with};

#[test]
fn test_reference_benchmark() {
    let f = fixture();
    let quote = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    assert!(
        (quote.estimated_remaining_value - dec!(2122)).abs() <= dec!(500),
        "{quote}"
    );
    assert_eq!(quote.iterations_used, 32);
    assert!(quote.projected_collateral_ratio >= dec!(1.05));
}

#[test]
fn test_round_trip_cost_within_bound() {
    let f = fixture();
    let cost = f.engine.estimate_wind_unwind_cost(&alice(), dec!(50000)).unwrap();
    assert!(cost > Decimal::ZERO);
    assert!(cost / dec!(50000) <= dec!(0.08), "cost {cost}");
}

#[test]
fn test_zero_principal() {
    let f = fixture();
    assert_eq!(
        f.engine.estimate_wind(&alice(), Decimal::ZERO).unwrap(),
        EstimateResult::zero()
    );
    assert_eq!(
        f.engine.estimate_wind_unwind_cost(&alice(), Decimal::ZERO).unwrap(),
        Decimal::ZERO
    );
}

#[test]
fn test_quotes_are_deterministic() {
    let f = fixture();
    let a = f.engine.estimate_wind(&alice(), dec!(31415.9265)).unwrap();
    let b = f.engine.estimate_wind(&alice(), dec!(31415.9265)).unwrap();
    assert_eq!(a, b);

    let other = fixture();
    let c = other.engine.estimate_wind(&alice(), dec!(31415.9265)).unwrap();
    assert_eq!(a, c);
}

#[test]
fn test_wind_cost_monotone_in_iterations() {
    let f = fixture_with(MarketConfig {
        curve: CurveKind::ConstantProduct,
        swap_fee: dec!(0.003),
        reserve_debt: dec!(5000000),
        reserve_paired: dec!(5000000),
        ..MarketConfig::default()
    });
    let mut previous = Decimal::ZERO;
    for n in 0..=16 {
        let quote = f
            .engine
            .estimate_wind_with(
                &alice(),
                dec!(50000),
                WindParams {
                    max_iterations: n,
                    target_leverage: None,
                },
            )
            .unwrap();
        assert!(quote.estimated_cost >= previous, "n={n} {quote}");
        assert!(quote.iterations_used <= n);
        previous = quote.estimated_cost;
    }
}

#[test]
fn test_target_leverage_stops_early() {
    let f = fixture();
    let quote = f
        .engine
        .estimate_wind_with(
            &alice(),
            dec!(50000),
            WindParams {
                max_iterations: 32,
                target_leverage: Some(dec!(4)),
            },
        )
        .unwrap();
    assert!(quote.iterations_used < 32, "{quote}");
    assert!(quote.estimated_remaining_value > dec!(2122));
}

#[test]
fn test_price_move_changes_quote() {
    let f = fixture();
    let before = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    f.market.set_price(dec!(1.02));
    let after = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    assert_ne!(before, after);
    assert!(after.projected_collateral_ratio >= dec!(1.05));
}

#[test]
fn test_existing_position_does_not_inflate_round_trip() {
    let f = fixture();
    f.seed(&bob(), dec!(3000), dec!(1000));
    let with_position = f.engine.estimate_wind_unwind_cost(&bob(), dec!(50000)).unwrap();
    let fresh = f.engine.estimate_wind_unwind_cost(&alice(), dec!(50000)).unwrap();
    assert!(with_position / dec!(50000) <= dec!(0.08));
    assert!((with_position - fresh).abs() < dec!(10), "{with_position} vs {fresh}");
}

#[test]
fn test_unwind_quote_without_position() {
    let f = fixture();
    assert_eq!(f.engine.estimate_unwind(&alice()).unwrap(), EstimateResult::zero());
}

#[test]
fn test_saturated_ceiling_is_reported() {
    let f = fixture_with(MarketConfig {
        total_debt: dec!(10000000),
        ..MarketConfig::default()
    });
    let err = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap_err();
    assert!(matches!(err, EngineError::CeilingExceeded { .. }), "{err}");
    assert_eq!(err.class(), ErrorClass::EconomicLimit);
}

#[test]
fn test_out_of_range_principal_is_quoted_not_panicked() {
    let f = fixture_with(MarketConfig {
        curve: CurveKind::ConstantProduct,
        swap_fee: dec!(0.003),
        reserve_debt: dec!(5000000),
        reserve_paired: dec!(5000000),
        ..MarketConfig::default()
    });
    let principal = dec!(100000000000000000000000);
    let quote = f.engine.estimate_wind(&alice(), principal).unwrap();
    assert_eq!(quote.iterations_used, 0);
    assert_eq!(quote.estimated_remaining_value, principal);

    let reference = fixture();
    let principal = dec!(50000000000000000000000000000);
    let quote = reference.engine.estimate_wind(&alice(), principal).unwrap();
    assert_eq!(quote.iterations_used, 0);
    assert_eq!(quote.estimated_remaining_value, principal);
    assert_eq!(
        reference.engine.estimate_wind_unwind_cost(&alice(), principal).unwrap(),
        Decimal::ZERO
    );
}

#[test]
fn test_zero_amplification_pool_offers_no_liquidity() {
    let f = fixture_with(MarketConfig {
        amplification: Decimal::ZERO,
        ..MarketConfig::default()
    });
    let quote = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    assert_eq!(quote.iterations_used, 0);
    assert_eq!(quote.estimated_remaining_value, dec!(50000));
}

#[test]
fn test_drained_venue_truncates_quote() {
    let f = fixture_with(MarketConfig {
        curve: CurveKind::ConstantSum,
        reserve_paired: dec!(60000),
        ..MarketConfig::default()
    });
    let quote = f.engine.estimate_wind(&alice(), dec!(50000)).unwrap();
    assert_eq!(quote.iterations_used, 2);
    assert!(
        quote.estimated_remaining_value > dec!(9109) && quote.estimated_remaining_value < dec!(9110),
        "{quote}"
    );
}
