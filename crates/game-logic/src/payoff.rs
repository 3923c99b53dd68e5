//! Payoff engine
//!
//! Pure functions from one round's action vector to one payoff per player.
//! Arithmetic is exact: payoffs are non-negative rationals.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineFault;
use crate::params::{gcd, GameParameters, Multiplier, Regime};
use crate::strategy::Action;

/// Exact non-negative rational payoff, kept in lowest terms.
///
/// Addition is checked: a sum that no longer fits `u64/u64` is `None`,
/// never a rounded or saturated value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payoff {
    num: u64,
    den: u64,
}

impl Payoff {
    pub const ZERO: Payoff = Payoff { num: 0, den: 1 };
    pub const ONE: Payoff = Payoff { num: 1, den: 1 };

    /// `num/den` in lowest terms; `None` for a zero denominator.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if num == 0 {
            return Some(Self::ZERO);
        }
        let g = gcd(num, den);
        Some(Self { num: num / g, den: den / g })
    }

    pub fn whole(value: u64) -> Self {
        Self { num: value, den: 1 }
    }

    pub fn numer(&self) -> u64 {
        self.num
    }

    pub fn denom(&self) -> u64 {
        self.den
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Exact sum, or `None` when the reduced result overflows.
    pub fn checked_add(self, rhs: Payoff) -> Option<Payoff> {
        let g = gcd(self.den, rhs.den) as u128;
        let lcm = self.den as u128 / g * rhs.den as u128;
        let lhs = (self.num as u128).checked_mul(lcm / self.den as u128)?;
        let rhs = (rhs.num as u128).checked_mul(lcm / rhs.den as u128)?;
        let num = lhs.checked_add(rhs)?;
        let g = gcd128(num, lcm);
        Some(Payoff {
            num: u64::try_from(num / g).ok()?,
            den: u64::try_from(lcm / g).ok()?,
        })
    }

    /// Sum of `payoffs`, or `None` on overflow.
    pub fn checked_sum<'a>(payoffs: impl IntoIterator<Item = &'a Payoff>) -> Option<Payoff> {
        payoffs.into_iter().try_fold(Payoff::ZERO, |acc, p| acc.checked_add(*p))
    }
}

impl Default for Payoff {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Multiplier> for Payoff {
    fn from(k: Multiplier) -> Self {
        Payoff { num: k.numer(), den: k.denom() }
    }
}

impl Ord for Payoff {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as u128 * other.den as u128).cmp(&(other.num as u128 * self.den as u128))
    }
}

impl PartialOrd for Payoff {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Payoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// Number of cooperators in an action vector
pub fn count_cooperators(actions: &[Action]) -> u32 {
    actions.iter().filter(|a| **a == Action::Cooperate).count() as u32
}

/// Compute one round's payoff vector.
///
/// - Linear: `payoff_i = (1 − c_i) + (k/n)·Σc_j`
/// - Threshold: `payoff_i = (1 − c_i) + k·𝟙[Σc_j ≥ m]`
///
/// Failures are engine faults: a vector whose length is not `n`, a
/// threshold regime without `m`, or arithmetic overflow. Parameters that
/// passed validation never overflow within a round.
pub fn compute_payoffs(
    actions: &[Action],
    params: &GameParameters,
    regime: Regime,
) -> Result<Vec<Payoff>, EngineFault> {
    let n = params.players as usize;
    if actions.len() != n {
        return Err(EngineFault::ActionCount { expected: n, got: actions.len() });
    }

    let cooperators = count_cooperators(actions) as u64;
    let k = params.multiplier;

    let shared = match regime {
        Regime::Linear => {
            let num = k.numer().checked_mul(cooperators).ok_or(EngineFault::PayoffOverflow)?;
            let den = k.denom().checked_mul(n as u64).ok_or(EngineFault::PayoffOverflow)?;
            Payoff::new(num, den).ok_or(EngineFault::PayoffOverflow)?
        }
        Regime::Threshold => {
            let m = params.threshold.ok_or(EngineFault::MissingThreshold)? as u64;
            if cooperators >= m {
                Payoff::from(k)
            } else {
                Payoff::ZERO
            }
        }
    };

    let defected = shared.checked_add(Payoff::ONE).ok_or(EngineFault::PayoffOverflow)?;
    Ok(actions
        .iter()
        .map(|a| match a {
            Action::Cooperate => shared,
            Action::Defect => defected,
        })
        .collect())
}
