//! Two-coin StableSwap pricing (Curve invariant).
//!
//! A·n^n·Σx + D = A·D·n^n + D^(n+1) / (n^n·Πx), with n = 2.
//! `D` and the post-trade balance `y` are found by Newton iteration; the
//! fee is taken from the output, as the Curve pools do.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::PricingModel;
use crate::types::{floor_amount, Amount, Ratio};

const N_COINS: Decimal = dec!(2);
const MAX_NEWTON_ROUNDS: usize = 255;

fn converged(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= dec!(0.000000000001)
}

#[derive(Debug, Clone)]
pub struct StableSwap {
    /// Amplification coefficient `A`.
    pub amplification: Decimal,
    pub fee: Ratio,
}

impl StableSwap {
    /// `A·n`, or `None` when the amplification is not positive.
    fn ann(&self) -> Option<Decimal> {
        if self.amplification <= Decimal::ZERO {
            return None;
        }
        self.amplification.checked_mul(N_COINS)
    }

    /// Invariant `D` for balances `x`, `y`.
    ///
    /// `None` when either balance is empty, the amplification is not
    /// positive, or the iteration leaves the representable range.
    pub fn invariant(&self, x: Amount, y: Amount) -> Option<Decimal> {
        if x <= Decimal::ZERO || y <= Decimal::ZERO {
            return None;
        }
        let ann = self.ann()?;
        let sum = x.checked_add(y)?;
        let x_n = x.checked_mul(N_COINS)?;
        let y_n = y.checked_mul(N_COINS)?;
        let mut d = sum;
        for _ in 0..MAX_NEWTON_ROUNDS {
            let mut d_p = d;
            d_p = d_p.checked_mul(d)?.checked_div(x_n)?;
            d_p = d_p.checked_mul(d)?.checked_div(y_n)?;
            let prev = d;
            let denominator = (ann - Decimal::ONE)
                .checked_mul(d)?
                .checked_add((N_COINS + Decimal::ONE).checked_mul(d_p)?)?;
            if denominator.is_zero() {
                return None;
            }
            let numerator = ann.checked_mul(sum)?.checked_add(d_p.checked_mul(N_COINS)?)?;
            d = numerator.checked_mul(d)?.checked_div(denominator)?;
            if converged(d, prev) {
                return Some(d);
            }
        }
        debug!(x = %x, y = %y, "StableSwap invariant did not converge");
        None
    }

    /// Balance of the other coin once this coin's balance is `x_new`.
    fn balance_for(&self, x_new: Amount, d: Decimal) -> Option<Decimal> {
        let ann = self.ann()?;
        let mut c = d;
        c = c.checked_mul(d)?.checked_div(x_new.checked_mul(N_COINS)?)?;
        c = c.checked_mul(d)?.checked_div(ann.checked_mul(N_COINS)?)?;
        let b = x_new.checked_add(d.checked_div(ann)?)?;
        let mut y = d;
        for _ in 0..MAX_NEWTON_ROUNDS {
            let prev = y;
            let denominator = Decimal::TWO.checked_mul(y)?.checked_add(b)? - d;
            if denominator <= Decimal::ZERO {
                return None;
            }
            y = y.checked_mul(y)?.checked_add(c)?.checked_div(denominator)?;
            if converged(y, prev) {
                return Some(y);
            }
        }
        debug!(x_new = %x_new, "StableSwap balance did not converge");
        None
    }
}

impl PricingModel for StableSwap {
    fn name(&self) -> &'static str {
        "stable-swap"
    }

    fn fee(&self) -> Ratio {
        self.fee
    }

    fn amount_out(&self, reserve_in: Amount, reserve_out: Amount, amount_in: Amount) -> Amount {
        if amount_in <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let Some(d) = self.invariant(reserve_in, reserve_out) else {
            return Decimal::ZERO;
        };
        let Some(y) = reserve_in
            .checked_add(amount_in)
            .and_then(|x_new| self.balance_for(x_new, d))
        else {
            return Decimal::ZERO;
        };
        let dy = reserve_out - y;
        if dy <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        floor_amount(dy * (Decimal::ONE - self.fee)).min(reserve_out)
    }
}
