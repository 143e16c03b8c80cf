//! GUNILEV: leveraged liquidity position engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the in-memory market from the `[market]` snapshot, then quotes
//! and executes one wind and unwind round trip.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn};

use gunilev::config;
use gunilev::engine::{quote_concurrently, LeverageEngine};
use gunilev::types::{AccountId, Amount};
use gunilev::venues::InMemoryMarket;

const BANNER: &str = r#"
  ____ _   _ _   _ ___ _     _____ __     __
 / ___| | | | \ | |_ _| |   | ____|\ \   / /
| |  _| | | |  \| || || |   |  _|   \ \ / /
| |_| | |_| | |\  || || |___| |___   \ V /
 \____|\___/|_| \_|___|_____|_____|   \_/

  Leveraged liquidity positions, wound and unwound atomically
  v0.1.0
"#;

const DEFAULT_PRINCIPAL: Amount = dec!(50000);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        config::AppConfig::resolve_env("GUNILEV_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.engine.name,
        collateral_type = %cfg.engine.collateral_type,
        max_iterations = cfg.engine.max_iterations,
        safety_buffer = %cfg.engine.safety_buffer,
        "GUNILEV starting up"
    );

    // -- Arguments ---------------------------------------------------------

    let mut args = std::env::args().skip(1);
    let principal = match args.next() {
        Some(raw) => raw
            .parse::<Decimal>()
            .with_context(|| format!("Invalid principal: {raw}"))?,
        None => DEFAULT_PRINCIPAL,
    };
    let owner = AccountId::new(args.next().unwrap_or_else(|| "alice".to_string()));

    // -- Wire the engine ---------------------------------------------------

    let market = InMemoryMarket::from_config(&cfg.market);
    let admin = cfg.engine.admin_id();
    let engine = Arc::new(LeverageEngine::new(cfg.engine.clone(), market.collaborators()));

    for entry in &cfg.pairs {
        engine.register(&admin, entry.collateral_type_id(), entry.pair_config())?;
    }
    engine.set_controllers(&admin, engine.build_controllers())?;

    // -- Quote -------------------------------------------------------------

    let wind_quote = engine.estimate_wind(&owner, principal)?;
    let round_trip = engine.estimate_wind_unwind_cost(&owner, principal)?;
    info!(
        owner = %owner,
        principal = %principal,
        wind = %wind_quote,
        round_trip_cost = %round_trip.round_dp(4),
        "Quoted"
    );

    let ladder: Vec<Amount> = [dec!(0.1), dec!(0.5), dec!(1), dec!(2)]
        .iter()
        .map(|scale| principal * *scale)
        .collect();
    let quotes = quote_concurrently(engine.clone(), owner.clone(), ladder.clone()).await;
    for (size, quote) in ladder.iter().zip(quotes) {
        match quote {
            Ok(q) => info!(principal = %size, quote = %q, "Ladder quote"),
            Err(e) => warn!(principal = %size, error = %e, class = ?e.class(), "Ladder quote failed"),
        }
    }

    // -- Execute -----------------------------------------------------------

    let receipt = engine.wind(&owner, principal, wind_quote.estimated_remaining_value)?;
    info!(
        position = %receipt.position,
        iterations = receipt.iterations,
        remaining = %receipt.remaining.round_dp(4),
        final_ratio = %receipt.final_ratio.round_dp(4),
        "Wound"
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    let unwind_quote = engine.estimate_unwind(&owner)?;
    let closed = engine.unwind(&owner, unwind_quote.estimated_remaining_value)?;
    info!(
        owner = %closed.owner,
        iterations = closed.iterations,
        residual = %closed.residual.round_dp(4),
        realised_cost = %(principal - receipt.remaining - closed.residual).round_dp(4),
        "Unwound"
    );
    println!("{}", serde_json::to_string_pretty(&closed)?);

    info!(
        flash_loans = market.lender.loan_count(),
        swaps = market.pool.swap_count(),
        "GUNILEV shut down cleanly"
    );
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gunilev=info"));

    let json_logging = std::env::var("GUNILEV_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
