//! Pair registry.
//!
//! Maps a collateral type to the adapter, paired asset and swap venue used
//! to lever it. Single writer (the administrator), many readers.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::types::{AccountId, CollateralType, EngineError, PairConfig};

#[derive(Debug)]
pub struct PairRegistry {
    admin: AccountId,
    entries: RwLock<HashMap<CollateralType, PairConfig>>,
}

impl PairRegistry {
    pub fn new(admin: AccountId) -> Self {
        Self {
            admin,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn require_admin(&self, caller: &AccountId) -> Result<(), EngineError> {
        if *caller != self.admin {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    /// Store `config` for `collateral_type`, replacing any previous entry.
    pub fn register(
        &self,
        caller: &AccountId,
        collateral_type: CollateralType,
        config: PairConfig,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        info!(collateral_type = %collateral_type, pair = %config, "Pair registered");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collateral_type, config);
        Ok(())
    }

    pub fn pair_config(&self, collateral_type: &CollateralType) -> Result<PairConfig, EngineError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collateral_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCollateralType(collateral_type.clone()))
    }

    /// Registered collateral types, sorted.
    pub fn registered(&self) -> Vec<CollateralType> {
        let mut types: Vec<CollateralType> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}
