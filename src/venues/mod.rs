//! External collaborators.
//!
//! Defines the interfaces the engine consumes and in-memory
//! implementations of each:
//! - `VaultLedger`: collateral/debt balances, ceilings, liquidation ratios
//! - `SwapVenue`: asset exchange with a price-impact curve
//! - `FlashLender`: transient liquidity repaid within the same unit
//! - `PriceOracle`: collateral price (resolver/spotter)
//! - `CollateralAdapter`: paired asset ⇄ collateral units (join)
//!
//! Stateful collaborators are `Journaled` so a controller can open an
//! atomic unit across all of them and roll every change back on failure.

pub mod adapter;
pub mod lender;
pub mod oracle;
pub mod pool;
pub mod vault;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::MarketConfig;
use crate::types::{
    ceil_amount, AccountId, AdapterId, Amount, AssetId, CollateralType, EngineError, LenderId,
    Position, Price, Ratio, VenueId,
};

pub use adapter::FixedRateAdapter;
pub use lender::SimFlashLender;
pub use oracle::StaticOracle;
pub use pool::CurvePool;
pub use vault::{IlkParams, InMemoryVault, VaultOp};

use crate::pricing::PoolCurve;

/// Lock a collaborator's shared state, recovering from poisoning.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flash fee charged on `amount` at `rate`, rounded up.
pub fn flash_fee(amount: Amount, rate: Ratio) -> Amount {
    ceil_amount(amount * rate)
}

// ---------------------------------------------------------------------------
// Journaling
// ---------------------------------------------------------------------------

/// Savepoint protocol for stateful collaborators.
///
/// `begin` records the current state, `commit` discards the record,
/// `rollback` restores it. Units do not nest.
pub trait Journaled {
    fn begin(&mut self);
    fn commit(&mut self);
    fn rollback(&mut self);
}

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// Ledger of collateral and debt per owner and collateral type.
pub trait VaultLedger: Journaled + Send {
    /// Asset the vault lends out.
    fn debt_asset(&self) -> AssetId;

    fn liquidation_ratio(&self, collateral_type: &CollateralType) -> Result<Ratio, EngineError>;

    fn debt_ceiling(&self, collateral_type: &CollateralType) -> Result<Amount, EngineError>;

    /// Debt outstanding across all owners of this collateral type.
    fn total_debt(&self, collateral_type: &CollateralType) -> Result<Amount, EngineError>;

    fn position(&self, owner: &AccountId, collateral_type: &CollateralType) -> Position;

    /// Collateral value / debt at the vault's spot price; `None` without debt.
    fn current_ratio(
        &self,
        owner: &AccountId,
        collateral_type: &CollateralType,
    ) -> Result<Option<Ratio>, EngineError>;

    fn deposit_collateral(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError>;

    fn withdraw_collateral(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError>;

    fn borrow(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError>;

    fn repay(
        &mut self,
        owner: &AccountId,
        collateral_type: &CollateralType,
        amount: Amount,
    ) -> Result<(), EngineError>;
}

/// Venue that exchanges one asset for another.
pub trait SwapVenue: Journaled + Send {
    fn id(&self) -> VenueId;

    /// Current reserves and pricing model, for forward simulation.
    fn curve(&self) -> PoolCurve;

    fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount, EngineError>;

    /// Execute a swap; fails with `SlippageExceeded` below `min_amount_out`.
    fn swap(
        &mut self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> Result<Amount, EngineError>;
}

/// Terms of a flash loan, handed to the borrower's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashGrant {
    pub lender: LenderId,
    pub initiator: AccountId,
    pub asset: AssetId,
    pub amount: Amount,
    pub fee: Amount,
}

impl FlashGrant {
    pub fn owed(&self) -> Amount {
        self.amount + self.fee
    }
}

/// Callback run while a flash loan is outstanding. Returns the amount paid back.
pub type FlashReceiver<'a> = dyn FnMut(&FlashGrant) -> Result<Amount, EngineError> + 'a;

/// Source of transient liquidity.
pub trait FlashLender: Journaled + Send {
    fn id(&self) -> LenderId;

    fn max_flash_loan(&self) -> Amount;

    /// Fee as a fraction of the borrowed amount.
    fn fee_rate(&self) -> Ratio;

    /// Lend `amount`, run `receiver`, and require `amount + fee` back.
    /// Returns the fee paid.
    fn flash_loan(
        &mut self,
        initiator: &AccountId,
        amount: Amount,
        receiver: &mut FlashReceiver<'_>,
    ) -> Result<Amount, EngineError>;
}

/// Collateral price feed.
#[cfg_attr(test, mockall::automock)]
pub trait PriceOracle: Send {
    /// Debt-asset value of one collateral unit.
    fn price(&self, collateral_type: &CollateralType) -> Result<Price, EngineError>;
}

/// Converts the paired asset into vault collateral units and back.
pub trait CollateralAdapter: fmt::Debug + Send + Sync {
    fn id(&self) -> AdapterId;

    /// Paired-asset units → collateral units.
    fn join(&self, paired_amount: Amount) -> Amount;

    /// Collateral units → paired-asset units.
    fn exit(&self, collateral_amount: Amount) -> Amount;
}

// ---------------------------------------------------------------------------
// Collaborator bundle
// ---------------------------------------------------------------------------

/// Everything a controller touches during one unit of work.
pub struct Collaborators {
    pub vault: Box<dyn VaultLedger>,
    pub oracle: Box<dyn PriceOracle>,
    pub lender: Box<dyn FlashLender>,
    pub venues: HashMap<VenueId, Box<dyn SwapVenue>>,
    pub adapters: HashMap<AdapterId, Arc<dyn CollateralAdapter>>,
}

impl Collaborators {
    pub fn new(
        vault: Box<dyn VaultLedger>,
        oracle: Box<dyn PriceOracle>,
        lender: Box<dyn FlashLender>,
    ) -> Self {
        Self {
            vault,
            oracle,
            lender,
            venues: HashMap::new(),
            adapters: HashMap::new(),
        }
    }

    pub fn with_venue(mut self, venue: Box<dyn SwapVenue>) -> Self {
        self.venues.insert(venue.id(), venue);
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn CollateralAdapter>) -> Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    pub fn venue(&self, id: &VenueId) -> Result<&dyn SwapVenue, EngineError> {
        self.venues
            .get(id)
            .map(|v| v.as_ref())
            .ok_or_else(|| EngineError::UnknownVenue(id.clone()))
    }

    pub fn adapter(&self, id: &AdapterId) -> Result<Arc<dyn CollateralAdapter>, EngineError> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAdapter(id.clone()))
    }
}

impl Journaled for Collaborators {
    fn begin(&mut self) {
        self.vault.begin();
        self.lender.begin();
        for venue in self.venues.values_mut() {
            venue.begin();
        }
    }

    fn commit(&mut self) {
        self.vault.commit();
        self.lender.commit();
        for venue in self.venues.values_mut() {
            venue.commit();
        }
    }

    fn rollback(&mut self) {
        self.vault.rollback();
        self.lender.rollback();
        for venue in self.venues.values_mut() {
            venue.rollback();
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory market
// ---------------------------------------------------------------------------

/// Shared handles to a complete in-memory market.
///
/// Handles are cheap clones over the same state, so the binary and tests
/// can keep one to inspect balances or inject faults after the boxed
/// copies have been moved into a `Collaborators` bundle.
#[derive(Clone)]
pub struct InMemoryMarket {
    pub collateral_type: CollateralType,
    pub vault: InMemoryVault,
    pub oracle: StaticOracle,
    pub lender: SimFlashLender,
    pub pool: CurvePool,
    pub adapter: Arc<FixedRateAdapter>,
}

impl InMemoryMarket {
    pub fn from_config(market: &MarketConfig) -> Self {
        let collateral_type = CollateralType::new(market.collateral_type.clone());
        let debt_asset = AssetId::new(market.debt_asset.clone());

        let vault = InMemoryVault::new(debt_asset.clone());
        vault.add_collateral_type(
            collateral_type.clone(),
            IlkParams {
                spot: market.price,
                liquidation_ratio: market.liquidation_ratio,
                debt_ceiling: market.debt_ceiling,
                total_debt: market.total_debt,
            },
        );

        let oracle = StaticOracle::new();
        oracle.set_price(&collateral_type, market.price);

        let lender = SimFlashLender::new(
            LenderId::new(market.lender.clone()),
            debt_asset.clone(),
            market.flash_capacity,
            market.flash_fee_rate,
        );

        let curve = PoolCurve::new(
            debt_asset,
            market.reserve_debt,
            AssetId::new(market.paired_asset.clone()),
            market.reserve_paired,
            market.curve.build(market.swap_fee, market.amplification),
        );
        let pool = CurvePool::new(VenueId::new(market.venue.clone()), curve);

        let adapter = Arc::new(FixedRateAdapter::new(
            AdapterId::new(market.adapter.clone()),
            market.adapter_rate,
        ));

        Self {
            collateral_type,
            vault,
            oracle,
            lender,
            pool,
            adapter,
        }
    }

    /// Box fresh handles into a collaborator bundle.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Box::new(self.vault.clone()),
            Box::new(self.oracle.clone()),
            Box::new(self.lender.clone()),
        )
        .with_venue(Box::new(self.pool.clone()))
        .with_adapter(self.adapter.clone())
    }

    /// Move the oracle and the vault spot together.
    pub fn set_price(&self, price: Price) {
        self.oracle.set_price(&self.collateral_type, price);
        self.vault.poke(&self.collateral_type, price);
    }
}
