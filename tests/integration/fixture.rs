//! Engine fixture for integration testing.
//!
//! Builds a `LeverageEngine` over the reference market (DAI debt, USDC
//! paired asset, a deep StableSwap pool) with the pair registered and
//! the controllers bound, and keeps the market handles so tests can
//! inspect balances or arm faults afterwards.

use rust_decimal::Decimal;
use std::sync::Arc;

use gunilev::config::{EngineConfig, MarketConfig};
use gunilev::engine::LeverageEngine;
use gunilev::types::{AccountId, Amount, Position};
use gunilev::venues::InMemoryMarket;

pub struct Fixture {
    pub engine: Arc<LeverageEngine>,
    pub market: InMemoryMarket,
    pub admin: AccountId,
}

/// Everything an atomic unit may touch, captured for before/after checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub position: Position,
    pub total_debt: Amount,
    pub flash_liquidity: Amount,
    pub flash_fees: Amount,
    pub reserve_debt: Option<Amount>,
    pub reserve_paired: Option<Amount>,
}

pub fn fixture() -> Fixture {
    fixture_with(MarketConfig::default())
}

pub fn fixture_with(market_config: MarketConfig) -> Fixture {
    let engine_config = EngineConfig::default();
    let admin = engine_config.admin_id();
    let market = InMemoryMarket::from_config(&market_config);
    let engine = Arc::new(LeverageEngine::new(engine_config, market.collaborators()));

    let entry = market_config.pair_entry();
    engine
        .register(&admin, entry.collateral_type_id(), entry.pair_config())
        .expect("admin registers the reference pair");
    engine
        .set_controllers(&admin, engine.build_controllers())
        .expect("admin binds controllers");

    Fixture {
        engine,
        market,
        admin,
    }
}

pub fn alice() -> AccountId {
    AccountId::from("alice")
}

pub fn bob() -> AccountId {
    AccountId::from("bob")
}

impl Fixture {
    pub fn baseline(&self, owner: &AccountId) -> Baseline {
        let ilk = &self.market.collateral_type;
        Baseline {
            position: self.engine.position(owner),
            total_debt: self
                .market
                .vault
                .params(ilk)
                .map(|p| p.total_debt)
                .unwrap_or(Decimal::ZERO),
            flash_liquidity: self.market.lender.liquidity(),
            flash_fees: self.market.lender.fees_collected(),
            reserve_debt: self.market.pool.reserve_of(&"DAI".into()),
            reserve_paired: self.market.pool.reserve_of(&"USDC".into()),
        }
    }

    /// Give `owner` an existing safe position of `collateral` against `debt`.
    pub fn seed(&self, owner: &AccountId, collateral: Amount, debt: Amount) {
        self.market
            .vault
            .seed_position(owner, &self.market.collateral_type, collateral, debt);
    }
}
