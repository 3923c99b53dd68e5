//! Tournament configuration
//!
//! Loaded from JSON and validated in full before any game is scheduled.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use game_logic::{binomial, sampled_group_count, ConfigError, GameConfig, PlayerStrategy};
use serde::{Deserialize, Serialize};

use crate::error::TournamentError;

/// Upper bound on scheduled games
pub const MAX_GAMES: u64 = 10_000_000;

/// 32-byte tournament seed.
///
/// Written as 64 hex digits (optionally `0x`-prefixed) or as an integer,
/// which fills the first eight bytes little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SeedRepr", into = "SeedRepr")]
pub struct Seed(pub [u8; 32]);

impl Seed {
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        Seed(bytes)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Seed {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let hex = text.strip_prefix("0x").unwrap_or(text);
        let malformed = || ConfigError::MalformedSeed(s.to_string());

        if hex.len() != 64 || !hex.is_ascii() {
            return Err(malformed());
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| malformed())?;
        }
        Ok(Seed(bytes))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SeedRepr {
    Int(u64),
    Hex(String),
}

impl TryFrom<SeedRepr> for Seed {
    type Error = ConfigError;

    fn try_from(repr: SeedRepr) -> Result<Self, Self::Error> {
        match repr {
            SeedRepr::Int(v) => Ok(Seed::from_u64(v)),
            SeedRepr::Hex(s) => s.parse(),
        }
    }
}

impl From<Seed> for SeedRepr {
    fn from(seed: Seed) -> Self {
        SeedRepr::Hex(seed.to_string())
    }
}

/// One named strategy taking part in the tournament
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantConfig {
    pub id: String,
    pub strategy: PlayerStrategy,
}

/// How entrants are combined into games
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grouping {
    /// Every combination of `n` distinct entrants, plus one all-same game
    /// per entrant when `self_play` is set.
    RoundRobin {
        #[serde(default)]
        self_play: bool,
    },
    /// Seeded random groups; each entrant plays at least `games_per_entrant` games.
    Sampled { games_per_entrant: u32 },
}

impl Default for Grouping {
    fn default() -> Self {
        Grouping::RoundRobin { self_play: false }
    }
}

impl Grouping {
    /// Games this grouping yields for one game configuration
    pub fn group_count(&self, entrants: usize, seats: u32) -> u64 {
        match *self {
            Grouping::RoundRobin { self_play } => {
                let combos = binomial(entrants as u64, seats as u64);
                if self_play {
                    combos.saturating_add(entrants as u64)
                } else {
                    combos
                }
            }
            Grouping::Sampled { games_per_entrant } => {
                sampled_group_count(entrants as u32, seats, games_per_entrant)
            }
        }
    }
}

/// Full tournament description
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub seed: Seed,
    /// Parameter sweep; every grouping is played under every entry.
    pub games: Vec<GameConfig>,
    pub entrants: Vec<EntrantConfig>,
    #[serde(default)]
    pub grouping: Grouping,
    /// Repetitions of every grouping, with seats rotated per trial
    #[serde(default = "default_trials")]
    pub trials: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-decision budget; external entrants are isolated on worker threads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_timeout_ms: Option<u64>,
}

fn default_trials() -> u32 {
    1
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl TournamentConfig {
    /// Parse and validate
    pub fn from_json_str(text: &str) -> Result<Self, TournamentError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TournamentError> {
        let path = path.as_ref();
        log::debug!("loading tournament configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, TournamentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter set, strategy and scheduling knob.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entrant in &self.entrants {
            entrant.strategy.validate()?;
        }
        validate_layout(
            &self.games,
            self.entrants.iter().map(|e| e.id.as_str()),
            self.grouping,
            self.trials,
            self.workers,
        )?;
        Ok(())
    }
}

/// Shared structural checks; returns the number of games the layout schedules.
pub(crate) fn validate_layout<'a>(
    games: &[GameConfig],
    ids: impl Iterator<Item = &'a str>,
    grouping: Grouping,
    trials: u32,
    workers: usize,
) -> Result<u64, ConfigError> {
    if games.is_empty() {
        return Err(ConfigError::NoGames);
    }
    for game in games {
        game.validate()?;
    }

    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateEntrant(id.to_string()));
        }
    }
    let entrants = seen.len();
    if entrants == 0 {
        return Err(ConfigError::NoEntrants);
    }

    if trials == 0 {
        return Err(ConfigError::ZeroTrials);
    }
    if workers == 0 {
        return Err(ConfigError::ZeroWorkers);
    }

    let mut total = 0u64;
    for game in games {
        let seats = game.params.players;
        match grouping {
            Grouping::RoundRobin { self_play } => {
                if !self_play && (entrants as u64) < seats as u64 {
                    return Err(ConfigError::TooFewEntrants { entrants, seats });
                }
            }
            Grouping::Sampled { games_per_entrant } => {
                if games_per_entrant == 0 {
                    return Err(ConfigError::ZeroGamesPerEntrant);
                }
            }
        }
        let games = grouping.group_count(entrants, seats).saturating_mul(trials as u64);
        total = total.saturating_add(games);
    }

    if total > MAX_GAMES {
        return Err(ConfigError::TooManyGames { games: total, limit: MAX_GAMES });
    }
    Ok(total)
}
