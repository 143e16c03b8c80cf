//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! `[market]` table describes the in-memory collaborators the binary runs
//! against; its defaults are the DAI/USDC reference snapshot.

use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::pricing::CurveKind;
use crate::types::{AccountId, Amount, CollateralType, PairConfig, Price, Ratio};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pairs: Vec<PairEntry>,
    #[serde(default)]
    pub market: MarketConfig,
}

/// Engine identity and schedule parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Account the engine acts as; flash callbacks must name it as initiator.
    pub account: String,
    /// Only account allowed to register pairs and bind controllers.
    pub admin: String,
    /// Collateral type this engine instance manages.
    pub collateral_type: String,
    pub max_iterations: u32,
    /// Tranches below this amount stop the wind loop.
    pub dust_threshold: Amount,
    /// Added to the liquidation ratio when sizing each borrow.
    pub safety_buffer: Ratio,
    /// Per-swap tolerance below the planned output.
    pub slippage_tolerance: Ratio,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "GUNILEV-001".to_string(),
            account: "gunilev".to_string(),
            admin: "admin".to_string(),
            collateral_type: "GUNIV3DAIUSDC1-A".to_string(),
            max_iterations: 32,
            dust_threshold: dec!(1),
            safety_buffer: dec!(0.05),
            slippage_tolerance: dec!(0.005),
        }
    }
}

impl EngineConfig {
    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.account.clone())
    }

    pub fn admin_id(&self) -> AccountId {
        AccountId::new(self.admin.clone())
    }

    pub fn collateral_type_id(&self) -> CollateralType {
        CollateralType::new(self.collateral_type.clone())
    }
}

/// One `[[pairs]]` entry.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PairEntry {
    pub collateral_type: String,
    pub collateral_adapter: String,
    pub paired_asset: String,
    pub swap_venue: String,
}

impl PairEntry {
    pub fn collateral_type_id(&self) -> CollateralType {
        CollateralType::new(self.collateral_type.clone())
    }

    pub fn pair_config(&self) -> PairConfig {
        PairConfig::new(
            self.collateral_adapter.clone(),
            self.paired_asset.clone(),
            self.swap_venue.clone(),
        )
    }
}

/// In-memory market the binary builds its collaborators from.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    pub collateral_type: String,
    pub debt_asset: String,
    pub paired_asset: String,
    pub adapter: String,
    pub venue: String,
    pub lender: String,
    /// Debt-asset value of one collateral unit.
    pub price: Price,
    pub liquidation_ratio: Ratio,
    pub debt_ceiling: Amount,
    /// Debt already drawn against the collateral type by other owners.
    pub total_debt: Amount,
    pub curve: CurveKind,
    pub reserve_debt: Amount,
    pub reserve_paired: Amount,
    pub amplification: Decimal,
    pub swap_fee: Ratio,
    pub flash_fee_rate: Ratio,
    pub flash_capacity: Amount,
    /// Collateral units minted per paired-asset unit.
    pub adapter_rate: Ratio,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            collateral_type: "GUNIV3DAIUSDC1-A".to_string(),
            debt_asset: "DAI".to_string(),
            paired_asset: "USDC".to_string(),
            adapter: "guni-join".to_string(),
            venue: "curve-3pool".to_string(),
            lender: "dss-flash".to_string(),
            price: dec!(1),
            liquidation_ratio: dec!(1.05),
            debt_ceiling: dec!(10000000),
            total_debt: Decimal::ZERO,
            curve: CurveKind::StableSwap,
            reserve_debt: dec!(500000000),
            reserve_paired: dec!(500000000),
            amplification: dec!(2000),
            swap_fee: dec!(0.0004),
            flash_fee_rate: Decimal::ZERO,
            flash_capacity: dec!(100000000),
            adapter_rate: dec!(1),
        }
    }
}

impl MarketConfig {
    /// Pair entry matching this market's adapter, paired asset and venue.
    pub fn pair_entry(&self) -> PairEntry {
        PairEntry {
            collateral_type: self.collateral_type.clone(),
            collateral_adapter: self.adapter.clone(),
            paired_asset: self.paired_asset.clone(),
            swap_venue: self.venue.clone(),
        }
    }

    /// Reject parameters the pricing model cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.curve == CurveKind::StableSwap {
            ensure!(
                self.amplification > Decimal::ZERO,
                "market.amplification must be positive for a stable_swap curve, got {}",
                self.amplification
            );
        }
        ensure!(
            self.swap_fee >= Decimal::ZERO && self.swap_fee < Decimal::ONE,
            "market.swap_fee must be in [0, 1), got {}",
            self.swap_fee
        );
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid configuration")?;
        config.market.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
