//! Tournament-level errors

use game_logic::ConfigError;
use thiserror::Error;

/// Why a tournament could not be built or run.
///
/// Individual game failures are counted in the result, not raised here.
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("invalid tournament configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("malformed configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a game or a partial aggregate could not be folded into the standings.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("cannot merge standings built over different entrant lists")]
    EntrantMismatch,

    #[error("game {game} seats unknown entrant {entrant}")]
    UnknownEntrant { game: u64, entrant: usize },

    #[error("exact payoff total for {id:?} overflowed")]
    Overflow { id: String },
}
