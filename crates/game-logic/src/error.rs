//! Error types for game construction and execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vm::BytecodeError;

/// Why a seat's action was replaced by Defect for one round.
///
/// Recoverable: attached to the round record, never aborts a game.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DecisionFault {
    /// The policy produced something other than Cooperate or Defect.
    #[error("invalid action: {raw:?}")]
    InvalidAction { raw: String },

    /// The policy did not answer within the decision budget.
    #[error("decision timed out after {millis} ms")]
    Timeout { millis: u64 },
}

/// Game parameters or strategy definitions that violate documented constraints.
///
/// Surfaced before any round runs.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a game needs at least 2 players, got {0}")]
    TooFewPlayers(u32),

    #[error("a game needs more than 1 round, got {0}")]
    TooFewRounds(u32),

    #[error("multiplier must exceed 1, got {0}")]
    MultiplierTooSmall(String),

    #[error("linear multiplier must stay below the player count {players}, got {multiplier}")]
    MultiplierTooLarge { multiplier: String, players: u32 },

    #[error("multiplier {multiplier} is too large to score exactly with {players} players")]
    MultiplierOutOfRange { multiplier: String, players: u32 },

    #[error("threshold regime requires a threshold")]
    MissingThreshold,

    #[error("threshold must satisfy 1 < m < {players}, got {threshold}")]
    ThresholdOutOfRange { threshold: u32, players: u32 },

    #[error("malformed multiplier {0:?}")]
    MalformedMultiplier(String),

    #[error("expected {expected} seats, got {got}")]
    SeatCount { expected: u32, got: usize },

    #[error("invalid custom strategy bytecode: {0}")]
    InvalidBytecode(#[from] BytecodeError),

    #[error("a tournament needs at least one game configuration")]
    NoGames,

    #[error("a tournament needs at least one entrant")]
    NoEntrants,

    #[error("duplicate entrant id {0:?}")]
    DuplicateEntrant(String),

    #[error("{entrants} entrants cannot fill {seats} distinct seats")]
    TooFewEntrants { entrants: usize, seats: u32 },

    #[error("games per entrant must be at least 1")]
    ZeroGamesPerEntrant,

    #[error("trials must be at least 1")]
    ZeroTrials,

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("schedule has {games} games, above the limit of {limit}")]
    TooManyGames { games: u64, limit: u64 },

    #[error("malformed seed {0:?}: expected 64 hex digits or an integer")]
    MalformedSeed(String),
}

/// An internal invariant violation. Fatal to the affected game only.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineFault {
    #[error("payoff engine received {got} actions for {expected} players")]
    ActionCount { expected: usize, got: usize },

    #[error("threshold regime evaluated without a threshold")]
    MissingThreshold,

    #[error("round {got} appended where round {expected} was due")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("round {round} exceeds the configured {rounds} rounds")]
    PastFinalRound { round: u32, rounds: u32 },

    #[error("round {round} carries {got} entries for {expected} players")]
    RecordWidth { round: u32, expected: usize, got: usize },

    #[error("round {round} reports {reported} cooperators, actions show {actual}")]
    CooperatorMismatch { round: u32, reported: u32, actual: u32 },

    #[error("payoff arithmetic overflowed")]
    PayoffOverflow,

    #[error("game already finished")]
    Finished,
}

/// Why a game did not produce a finished ledger.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("invalid game configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("engine fault: {0}")]
    Engine(#[from] EngineFault),

    #[error("game cancelled before round {round}")]
    Cancelled { round: u32 },
}
