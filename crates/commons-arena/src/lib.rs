//! Commons Arena
//!
//! Runs tournaments of heterogeneous policies in repeated Public Goods and
//! Collective Risk games. A [`TournamentConfig`] (or a [`Tournament`] built
//! in code) is expanded into a seeded list of games, the games are played
//! in parallel, and every seat's result is folded into per-entrant
//! statistics ranked by mean payoff.

mod aggregate;
mod config;
mod error;
mod scheduler;

pub use aggregate::{aggregate, Accumulator, Aggregator, GameOutcome, Standing, TournamentResult};
pub use config::{EntrantConfig, Grouping, Seed, TournamentConfig, MAX_GAMES};
pub use error::{AggregateError, TournamentError};
pub use scheduler::{Entrant, GamePlan, Progress, Tournament};

pub use game_logic;
pub use game_logic::CancelToken;

/// Validate `config` and play the whole tournament.
pub fn run_tournament(config: &TournamentConfig, cancel: &CancelToken) -> Result<TournamentResult, TournamentError> {
    Tournament::from_config(config)?.run(cancel)
}
