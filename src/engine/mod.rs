//! Leverage engine: registry, estimation and wind/unwind execution.
//!
//! `LeverageEngine` is the facade callers use. It owns the pair registry,
//! the bound controllers and the collaborator bundle. Mutating calls hold
//! the collaborator lock for the whole unit of work, which serializes every
//! wind and unwind. Estimations hold it only long enough to capture a
//! snapshot and compute off the lock.

pub mod atomic;
pub mod estimator;
pub mod planner;
pub mod registry;
pub mod unwind;
pub mod wind;

use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::types::{
    AccountId, Amount, CollateralType, EngineError, EstimateResult, PairConfig, Position,
    UnwindReceipt, WindReceipt,
};
use crate::venues::{lock, Collaborators};

pub use atomic::{AtomicUnit, ControllerSettings, StateTrace};
pub use planner::{MarketSnapshot, PlannerParams, WindParams};
pub use registry::PairRegistry;
pub use unwind::{UnwindController, UnwindState};
pub use wind::{WindController, WindState};

/// The wind and unwind controllers an engine executes through.
#[derive(Debug, Clone)]
pub struct Controllers {
    pub wind: Arc<WindController>,
    pub unwind: Arc<UnwindController>,
}

impl Controllers {
    pub fn new(wind: Arc<WindController>, unwind: Arc<UnwindController>) -> Self {
        Self { wind, unwind }
    }
}

pub struct LeverageEngine {
    config: EngineConfig,
    collateral_type: CollateralType,
    planner: PlannerParams,
    registry: Arc<PairRegistry>,
    controllers: RwLock<Option<Controllers>>,
    collaborators: Mutex<Collaborators>,
}

impl LeverageEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let registry = Arc::new(PairRegistry::new(config.admin_id()));
        info!(
            name = %config.name,
            collateral_type = %config.collateral_type,
            max_iterations = config.max_iterations,
            "Leverage engine created"
        );
        Self {
            collateral_type: config.collateral_type_id(),
            planner: PlannerParams::from_config(&config),
            config,
            registry,
            controllers: RwLock::new(None),
            collaborators: Mutex::new(collaborators),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collateral_type(&self) -> &CollateralType {
        &self.collateral_type
    }

    pub fn registry(&self) -> &Arc<PairRegistry> {
        &self.registry
    }

    // -- Admin surface -------------------------------------------------------

    pub fn register(
        &self,
        caller: &AccountId,
        collateral_type: CollateralType,
        config: PairConfig,
    ) -> Result<(), EngineError> {
        self.registry.register(caller, collateral_type, config)
    }

    /// Controllers wired to this engine's registry and configuration.
    pub fn build_controllers(&self) -> Controllers {
        let settings = ControllerSettings::from_config(&self.config);
        Controllers::new(
            Arc::new(WindController::new(self.registry.clone(), settings.clone())),
            Arc::new(UnwindController::new(self.registry.clone(), settings)),
        )
    }

    /// Bind (or rebind) the controllers. Administrator only.
    pub fn set_controllers(&self, caller: &AccountId, controllers: Controllers) -> Result<(), EngineError> {
        self.registry.require_admin(caller)?;
        let mut bound = self.controllers.write().unwrap_or_else(PoisonError::into_inner);
        if bound.is_some() {
            warn!(caller = %caller, "Rebinding controllers");
        }
        *bound = Some(controllers);
        Ok(())
    }

    fn bound_controllers(&self) -> Result<Controllers, EngineError> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::ControllersNotBound)
    }

    // -- Query surface -------------------------------------------------------

    pub fn pair_config(&self, collateral_type: &CollateralType) -> Result<PairConfig, EngineError> {
        self.registry.pair_config(collateral_type)
    }

    /// Capture the market as `owner` sees it right now.
    pub fn snapshot(&self, owner: &AccountId) -> Result<MarketSnapshot, EngineError> {
        let pair = self.registry.pair_config(&self.collateral_type)?;
        let collaborators = lock(&self.collaborators);
        MarketSnapshot::capture(&collaborators, &self.collateral_type, &pair, owner)
    }

    pub fn position(&self, owner: &AccountId) -> Position {
        lock(&self.collaborators)
            .vault
            .position(owner, &self.collateral_type)
    }

    pub fn estimate_wind(&self, owner: &AccountId, principal: Amount) -> Result<EstimateResult, EngineError> {
        self.estimate_wind_with(owner, principal, self.planner.wind_params())
    }

    /// `estimate_wind` with an explicit iteration bound or leverage target.
    pub fn estimate_wind_with(
        &self,
        owner: &AccountId,
        principal: Amount,
        params: WindParams,
    ) -> Result<EstimateResult, EngineError> {
        if principal.is_zero() {
            return Ok(EstimateResult::zero());
        }
        let snapshot = self.snapshot(owner)?;
        let estimate = estimator::estimate_wind(&snapshot, principal, &self.planner, &params)?;
        debug!(owner = %owner, principal = %principal, estimate = %estimate, "Wind estimated");
        Ok(estimate)
    }

    pub fn estimate_unwind(&self, owner: &AccountId) -> Result<EstimateResult, EngineError> {
        let snapshot = self.snapshot(owner)?;
        let estimate = estimator::estimate_unwind(&snapshot, self.planner.max_iterations)?;
        debug!(owner = %owner, estimate = %estimate, "Unwind estimated");
        Ok(estimate)
    }

    /// Value a wind of `principal` followed by a full unwind would lose.
    pub fn estimate_wind_unwind_cost(&self, owner: &AccountId, principal: Amount) -> Result<Amount, EngineError> {
        if principal.is_zero() {
            return Ok(Amount::ZERO);
        }
        let snapshot = self.snapshot(owner)?;
        let estimate = estimator::estimate_round_trip(
            &snapshot,
            principal,
            &self.planner,
            &self.planner.wind_params(),
        )?;
        debug!(owner = %owner, principal = %principal, estimate = %estimate, "Round trip estimated");
        Ok(estimate.estimated_cost)
    }

    // -- Execution surface ---------------------------------------------------

    /// Wind `principal` with the engine's default iteration bound.
    pub fn wind(
        &self,
        owner: &AccountId,
        principal: Amount,
        min_remaining: Amount,
    ) -> Result<WindReceipt, EngineError> {
        self.wind_with(owner, principal, min_remaining, self.planner.wind_params())
    }

    /// Wind `principal` under caller-supplied bounds, so a schedule quoted
    /// through `estimate_wind_with` can be executed as quoted.
    pub fn wind_with(
        &self,
        owner: &AccountId,
        principal: Amount,
        min_remaining: Amount,
        params: WindParams,
    ) -> Result<WindReceipt, EngineError> {
        let controllers = self.bound_controllers()?;
        let mut collaborators = lock(&self.collaborators);
        controllers.wind.wind(
            &mut collaborators,
            &self.collateral_type,
            owner,
            principal,
            min_remaining,
            &params,
        )
    }

    pub fn unwind(&self, owner: &AccountId, min_residual: Amount) -> Result<UnwindReceipt, EngineError> {
        let controllers = self.bound_controllers()?;
        let mut collaborators = lock(&self.collaborators);
        controllers
            .unwind
            .unwind(&mut collaborators, &self.collateral_type, owner, min_residual)
    }
}

/// Quote several principals concurrently on the blocking pool.
///
/// Results come back in the order of `principals`.
pub async fn quote_concurrently(
    engine: Arc<LeverageEngine>,
    owner: AccountId,
    principals: Vec<Amount>,
) -> Vec<Result<EstimateResult, EngineError>> {
    let tasks = principals.into_iter().map(|principal| {
        let engine = engine.clone();
        let owner = owner.clone();
        tokio::task::spawn_blocking(move || engine.estimate_wind(&owner, principal))
    });
    join_all(tasks).await.into_iter().map(flatten_joined).collect()
}

fn flatten_joined<T>(
    joined: Result<Result<T, EngineError>, tokio::task::JoinError>,
) -> Result<T, EngineError> {
    joined.unwrap_or_else(|e| {
        warn!(error = %e, "Engine task did not complete");
        Err(EngineError::TaskFailed(e.to_string()))
    })
}
