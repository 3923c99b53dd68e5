//! Game parameters, payoff regimes and their validation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Exact rational multiplier `k`, always stored in lowest terms.
///
/// Written in configuration as an integer (`2`), a decimal string (`"1.6"`)
/// or a fraction (`"8/5"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MultiplierRepr", into = "MultiplierRepr")]
pub struct Multiplier {
    num: u64,
    den: u64,
}

impl Multiplier {
    /// Build `num/den`. Fails on a zero numerator or denominator.
    pub fn new(num: u64, den: u64) -> Result<Self, ConfigError> {
        if num == 0 || den == 0 {
            return Err(ConfigError::MalformedMultiplier(format!("{}/{}", num, den)));
        }
        let g = gcd(num, den);
        Ok(Self { num: num / g, den: den / g })
    }

    pub fn whole(value: u64) -> Result<Self, ConfigError> {
        Self::new(value, 1)
    }

    pub fn numer(&self) -> u64 {
        self.num
    }

    pub fn denom(&self) -> u64 {
        self.den
    }

    /// k > 1
    pub fn exceeds_one(&self) -> bool {
        self.num > self.den
    }

    /// k < bound
    pub fn below(&self, bound: u64) -> bool {
        (self.num as u128) < (bound as u128) * (self.den as u128)
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Whether `(num + den)·players` fits in a `u64`, which keeps every
    /// single-round payoff representable.
    pub fn scores_exactly(&self, players: u32) -> bool {
        self.num
            .checked_add(self.den)
            .and_then(|sum| sum.checked_mul(players as u64))
            .is_some()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Multiplier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let malformed = || ConfigError::MalformedMultiplier(s.to_string());

        if let Some((num, den)) = text.split_once('/') {
            let num = num.trim().parse::<u64>().map_err(|_| malformed())?;
            let den = den.trim().parse::<u64>().map_err(|_| malformed())?;
            return Self::new(num, den);
        }

        if let Some((whole, frac)) = text.split_once('.') {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            let whole = if whole.is_empty() { 0 } else { whole.parse::<u64>().map_err(|_| malformed())? };
            let scale = 10u64.pow(frac.len() as u32);
            let frac = frac.parse::<u64>().map_err(|_| malformed())?;
            let num = whole
                .checked_mul(scale)
                .and_then(|w| w.checked_add(frac))
                .ok_or_else(malformed)?;
            return Self::new(num, scale);
        }

        let num = text.parse::<u64>().map_err(|_| malformed())?;
        Self::new(num, 1)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MultiplierRepr {
    Whole(u64),
    Text(String),
}

impl TryFrom<MultiplierRepr> for Multiplier {
    type Error = ConfigError;

    fn try_from(repr: MultiplierRepr) -> Result<Self, Self::Error> {
        match repr {
            MultiplierRepr::Whole(v) => Multiplier::whole(v),
            MultiplierRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Multiplier> for MultiplierRepr {
    fn from(m: Multiplier) -> Self {
        if m.den == 1 {
            MultiplierRepr::Whole(m.num)
        } else {
            MultiplierRepr::Text(m.to_string())
        }
    }
}

pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// Payoff regime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Public Goods Game: pool multiplied by k, shared by all n players.
    Linear,
    /// Collective Risk Dilemma: bonus k paid to all iff at least m cooperate.
    Threshold,
}

/// Immutable parameters of one game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameParameters {
    /// Number of players `n`
    #[serde(alias = "n")]
    pub players: u32,
    /// Number of rounds `r`
    #[serde(alias = "r")]
    pub rounds: u32,
    /// Cooperator threshold `m` (threshold regime only)
    #[serde(alias = "m", default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    /// Multiplier / reward `k`
    #[serde(alias = "k")]
    pub multiplier: Multiplier,
}

impl GameParameters {
    /// Check the documented constraints for the given regime:
    /// `n ≥ 2`, `r > 1`, `k > 1`, plus `k < n` (linear) or `1 < m < n` (threshold).
    /// `k` must also be small enough that one round's payoffs stay exact.
    pub fn validate(&self, regime: Regime) -> Result<(), ConfigError> {
        if self.players < 2 {
            return Err(ConfigError::TooFewPlayers(self.players));
        }
        if self.rounds < 2 {
            return Err(ConfigError::TooFewRounds(self.rounds));
        }
        if !self.multiplier.exceeds_one() {
            return Err(ConfigError::MultiplierTooSmall(self.multiplier.to_string()));
        }
        if !self.multiplier.scores_exactly(self.players) {
            return Err(ConfigError::MultiplierOutOfRange {
                multiplier: self.multiplier.to_string(),
                players: self.players,
            });
        }

        match regime {
            Regime::Linear => {
                if !self.multiplier.below(self.players as u64) {
                    return Err(ConfigError::MultiplierTooLarge {
                        multiplier: self.multiplier.to_string(),
                        players: self.players,
                    });
                }
            }
            Regime::Threshold => {
                let m = self.threshold.ok_or(ConfigError::MissingThreshold)?;
                if m <= 1 || m >= self.players {
                    return Err(ConfigError::ThresholdOutOfRange {
                        threshold: m,
                        players: self.players,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Parameters paired with the regime that scores them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameConfig {
    pub regime: Regime,
    pub params: GameParameters,
}

impl GameConfig {
    /// Validated Public Goods Game configuration
    pub fn linear(players: u32, rounds: u32, multiplier: Multiplier) -> Result<Self, ConfigError> {
        let config = Self {
            regime: Regime::Linear,
            params: GameParameters { players, rounds, threshold: None, multiplier },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validated Collective Risk Dilemma configuration
    pub fn threshold(
        players: u32,
        rounds: u32,
        threshold: u32,
        multiplier: Multiplier,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            regime: Regime::Threshold,
            params: GameParameters { players, rounds, threshold: Some(threshold), multiplier },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate(self.regime)
    }
}
