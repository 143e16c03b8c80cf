use gunilev::types::{AccountId, CollateralType, EngineError, ErrorClass, PairConfig};
use rust_decimal_macros::dec;

use crate::fixture::{alice, fixture};

#[test]
fn test_registered_pair_is_returned() {
    let f = fixture();
    let pair = f
        .engine
        .pair_config(&CollateralType::from("GUNIV3DAIUSDC1-A"))
        .unwrap();
    assert_eq!(pair, PairConfig::new("guni-join", "USDC", "curve-3pool"));
    assert_eq!(
        f.engine.registry().registered(),
        vec![CollateralType::from("GUNIV3DAIUSDC1-A")]
    );
}

#[test]
fn test_register_is_admin_only() {
    let f = fixture();
    let mallory = AccountId::from("mallory");
    let err = f
        .engine
        .register(
            &mallory,
            CollateralType::from("GUNIV3DAIUSDC1-A"),
            PairConfig::new("evil-join", "USDT", "evil-pool"),
        )
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized(mallory));
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert_eq!(
        f.engine
            .pair_config(&CollateralType::from("GUNIV3DAIUSDC1-A"))
            .unwrap()
            .swap_venue
            .as_str(),
        "curve-3pool"
    );
}

#[test]
fn test_reregistration_replaces_entry() {
    let f = fixture();
    let ilk = CollateralType::from("GUNIV3DAIUSDC1-A");
    f.engine
        .register(&f.admin, ilk.clone(), PairConfig::new("guni-join", "USDC", "uni-v3"))
        .unwrap();
    assert_eq!(f.engine.pair_config(&ilk).unwrap().swap_venue.as_str(), "uni-v3");

    // No such venue among the collaborators: quoting fails until restored.
    let err = f.engine.estimate_wind(&alice(), dec!(1000)).unwrap_err();
    assert!(matches!(err, EngineError::UnknownVenue(_)));

    f.engine
        .register(&f.admin, ilk, PairConfig::new("guni-join", "USDC", "curve-3pool"))
        .unwrap();
    assert!(f.engine.estimate_wind(&alice(), dec!(1000)).is_ok());
}

#[test]
fn test_unknown_collateral_type() {
    let f = fixture();
    let err = f
        .engine
        .pair_config(&CollateralType::from("ETH-A"))
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownCollateralType(CollateralType::from("ETH-A")));
    assert_eq!(err.class(), ErrorClass::Configuration);
}
