//! Game Logic for Commons Arena
//!
//! Core engine for repeated multi-player social dilemmas: the linear
//! Public Goods Game and the threshold Collective Risk Dilemma.
//! Payoffs are exact rationals, histories are append-only, and every
//! stochastic decision draws from a per-seat stream derived from the
//! game seed, so a game replays identically from its seed.

mod error;
mod game;
mod grouping;
mod ledger;
mod params;
mod payoff;
mod policy;
mod random;
mod strategy;
mod vm;

pub use error::{ConfigError, DecisionFault, EngineFault, GameError};
pub use game::{play, CancelToken, Game, GameState};
pub use grouping::{
    binomial, homogeneous_groups, permute_order, rotate_seats, round_robin_groups, sampled_group_count,
    sampled_groups, unrank_combination,
};
pub use ledger::{Ledger, RoundRecord};
pub use params::{GameConfig, GameParameters, Multiplier, Regime};
pub use payoff::{compute_payoffs, count_cooperators, Payoff};
pub use policy::{DecisionView, External, Isolated, PlayerStrategy, Policy, Runtime, Stateful};
pub use random::SeededRng;
pub use strategy::{decide, Action, MachineState, Override, Phase, Strategy, StrategyBase, StrategyParams};
pub use vm::{execute_bytecode, op, validate_bytecode, BytecodeError, VmFault, MAX_BYTECODE_LEN};
