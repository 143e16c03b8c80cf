//! In-memory swap pool backed by a `PoolCurve`.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{lock, Journaled, SwapVenue};
use crate::pricing::PoolCurve;
use crate::types::{floor_amount, Amount, AssetId, EngineError, Ratio, VenueId};

#[derive(Debug)]
struct PoolState {
    curve: PoolCurve,
    savepoint: Option<PoolCurve>,
    /// Fraction shaved off every realized output relative to the quote.
    haircut: Ratio,
    /// Swaps still allowed before the armed failure fires.
    fail_after: Option<usize>,
    swaps: u64,
}

/// Cloneable handle over a shared pool.
#[derive(Debug, Clone)]
pub struct CurvePool {
    id: VenueId,
    state: Arc<Mutex<PoolState>>,
}

impl CurvePool {
    pub fn new(id: VenueId, curve: PoolCurve) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(PoolState {
                curve,
                savepoint: None,
                haircut: Decimal::ZERO,
                fail_after: None,
                swaps: 0,
            })),
        }
    }

    /// Make realized outputs fall short of quotes by `haircut`, as if the
    /// pool moved between planning and execution.
    pub fn set_haircut(&self, haircut: Ratio) {
        lock(&self.state).haircut = haircut;
    }

    /// Make the `nth` (1-based) swap from now on fail.
    pub fn fail_on_swap(&self, nth: usize) {
        lock(&self.state).fail_after = Some(nth.saturating_sub(1));
    }

    pub fn reserve_of(&self, asset: &AssetId) -> Option<Amount> {
        lock(&self.state).curve.reserve_of(asset)
    }

    /// Swaps executed since creation (rolled-back swaps included).
    pub fn swap_count(&self) -> u64 {
        lock(&self.state).swaps
    }
}

impl Journaled for CurvePool {
    fn begin(&mut self) {
        let mut state = lock(&self.state);
        state.savepoint = Some(state.curve.clone());
    }

    fn commit(&mut self) {
        lock(&self.state).savepoint = None;
    }

    fn rollback(&mut self) {
        let mut state = lock(&self.state);
        if let Some(saved) = state.savepoint.take() {
            state.curve = saved;
        }
    }
}

impl SwapVenue for CurvePool {
    fn id(&self) -> VenueId {
        self.id.clone()
    }

    fn curve(&self) -> PoolCurve {
        lock(&self.state).curve.clone()
    }

    fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount, EngineError> {
        lock(&self.state).curve.quote(asset_in, asset_out, amount_in)
    }

    fn swap(
        &mut self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> Result<Amount, EngineError> {
        if amount_in <= Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "swap amount must be positive, got {amount_in}"
            )));
        }
        let mut state = lock(&self.state);
        let armed = state.fail_after;
        match armed {
            Some(0) => {
                state.fail_after = None;
                debug!(venue = %self.id, "Injected swap fault");
                return Err(EngineError::SlippageExceeded {
                    minimum: min_amount_out,
                    actual: Decimal::ZERO,
                });
            }
            Some(n) => state.fail_after = Some(n - 1),
            None => {}
        }

        let quoted = state.curve.quote(asset_in, asset_out, amount_in)?;
        let out = floor_amount(quoted * (Decimal::ONE - state.haircut));
        if out < min_amount_out || out.is_zero() {
            return Err(EngineError::SlippageExceeded {
                minimum: min_amount_out,
                actual: out,
            });
        }
        state.curve.settle(asset_in, asset_out, amount_in, out)?;
        state.swaps += 1;
        debug!(
            venue = %self.id,
            asset_in = %asset_in,
            amount_in = %amount_in,
            amount_out = %out,
            "Swap executed"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::CurveKind;
    use rust_decimal_macros::dec;

    fn dai() -> AssetId {
        AssetId::from("DAI")
    }

    fn usdc() -> AssetId {
        AssetId::from("USDC")
    }

    fn pool() -> CurvePool {
        let curve = PoolCurve::new(
            dai(),
            dec!(1000000),
            usdc(),
            dec!(1000000),
            CurveKind::ConstantProduct.build(dec!(0.003), Decimal::ZERO),
        );
        CurvePool::new(VenueId::from("uni"), curve)
    }

    #[test]
    fn test_swap_matches_quote_and_moves_reserves() {
        let mut p = pool();
        let quoted = p.quote(&dai(), &usdc(), dec!(1000)).unwrap();
        let out = p.swap(&dai(), &usdc(), dec!(1000), quoted).unwrap();
        assert_eq!(out, quoted);
        assert_eq!(p.reserve_of(&dai()), Some(dec!(1001000)));
        assert_eq!(p.reserve_of(&usdc()), Some(dec!(1000000) - out));
    }

    #[test]
    fn test_min_out_enforced() {
        let mut p = pool();
        let quoted = p.quote(&dai(), &usdc(), dec!(1000)).unwrap();
        let err = p.swap(&dai(), &usdc(), dec!(1000), quoted + dec!(1)).unwrap_err();
        assert!(matches!(err, EngineError::SlippageExceeded { .. }));
        assert_eq!(p.reserve_of(&dai()), Some(dec!(1000000)));
    }

    #[test]
    fn test_haircut_lowers_realized_output() {
        let mut p = pool();
        let quoted = p.quote(&dai(), &usdc(), dec!(1000)).unwrap();
        p.set_haircut(dec!(0.01));
        let out = p.swap(&dai(), &usdc(), dec!(1000), Decimal::ZERO).unwrap();
        assert!(out < quoted);
    }

    #[test]
    fn test_rollback_restores_reserves() {
        let mut p = pool();
        p.begin();
        p.swap(&dai(), &usdc(), dec!(5000), Decimal::ZERO).unwrap();
        p.rollback();
        assert_eq!(p.reserve_of(&dai()), Some(dec!(1000000)));
        assert_eq!(p.reserve_of(&usdc()), Some(dec!(1000000)));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let mut p = pool();
        p.fail_on_swap(2);
        p.swap(&dai(), &usdc(), dec!(10), Decimal::ZERO).unwrap();
        assert!(p.swap(&dai(), &usdc(), dec!(10), Decimal::ZERO).is_err());
        p.swap(&dai(), &usdc(), dec!(10), Decimal::ZERO).unwrap();
        assert_eq!(p.swap_count(), 2);
    }
}
