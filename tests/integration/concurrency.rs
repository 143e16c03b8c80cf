use gunilev::engine::quote_concurrently;
use gunilev::types::Amount;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixture::{alice, bob, fixture};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_quotes_match_sequential() {
    let f = fixture();
    let principals: Vec<Amount> = vec![dec!(500), dec!(5000), dec!(50000), dec!(250000)];
    let quotes = quote_concurrently(f.engine.clone(), alice(), principals.clone()).await;

    assert_eq!(quotes.len(), principals.len());
    for (principal, quote) in principals.iter().zip(quotes) {
        let sequential = f.engine.estimate_wind(&alice(), *principal).unwrap();
        assert_eq!(quote.unwrap(), sequential, "principal {principal}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_winds_serialize() {
    let f = fixture();
    let handles: Vec<_> = [alice(), bob()]
        .into_iter()
        .map(|owner| {
            let engine = f.engine.clone();
            tokio::task::spawn_blocking(move || engine.wind(&owner, dec!(50000), Decimal::ZERO))
        })
        .collect();

    let mut debt = Decimal::ZERO;
    for joined in futures::future::join_all(handles).await {
        let receipt = joined.unwrap().unwrap();
        assert!(receipt.final_ratio >= dec!(1.05));
        debt += receipt.position.debt_amount;
    }
    let total = f
        .market
        .vault
        .params(&f.market.collateral_type)
        .unwrap()
        .total_debt;
    assert_eq!(total, debt);
    assert_eq!(f.market.lender.loan_count(), 2);
    assert!(f.market.lender.outstanding().is_zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quotes_never_see_a_partial_wind() {
    let f = fixture();
    let before = f.engine.estimate_wind(&bob(), dec!(20000)).unwrap();

    let engine = f.engine.clone();
    let wind = tokio::task::spawn_blocking(move || engine.wind(&alice(), dec!(50000), Decimal::ZERO));
    let observed: Vec<_> = (0..8)
        .map(|_| {
            let engine = f.engine.clone();
            tokio::task::spawn_blocking(move || engine.estimate_wind(&bob(), dec!(20000)))
        })
        .collect();

    wind.await.unwrap().unwrap();
    let after = f.engine.estimate_wind(&bob(), dec!(20000)).unwrap();
    assert_ne!(before, after);

    for joined in futures::future::join_all(observed).await {
        let quote = joined.unwrap().unwrap();
        assert!(quote == before || quote == after, "partial state observed: {quote}");
    }
}
