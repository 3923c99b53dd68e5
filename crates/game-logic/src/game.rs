//! Round orchestrator
//!
//! Drives one game from parameters to a finished ledger. Each round every
//! seat decides against the history strictly before it, faulted decisions
//! become Defect, payoffs are computed and the record is appended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ConfigError, DecisionFault, GameError};
use crate::ledger::{Ledger, RoundRecord};
use crate::params::GameConfig;
use crate::payoff::compute_payoffs;
use crate::policy::{DecisionView, PlayerStrategy, Policy, Runtime};
use crate::random::SeededRng;
use crate::strategy::Action;

/// Shared cancellation flag, checked between rounds
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a game
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    Initializing,
    /// Round `round` is next to be played
    Running { round: u32 },
    Finished,
}

/// One game: parameters, seated policies and the ledger they produce.
pub struct Game {
    config: GameConfig,
    seats: Vec<Box<dyn Policy>>,
    ledger: Ledger,
    rng: SeededRng,
    state: GameState,
    decision_budget: Option<Duration>,
}

impl Game {
    /// Validate the configuration and seat one policy per player.
    pub fn new(config: GameConfig, seats: Vec<Box<dyn Policy>>, rng: SeededRng) -> Result<Self, ConfigError> {
        config.validate()?;
        if seats.len() != config.params.players as usize {
            return Err(ConfigError::SeatCount {
                expected: config.params.players,
                got: seats.len(),
            });
        }

        Ok(Self {
            ledger: Ledger::new(&config.params),
            config,
            seats,
            rng,
            state: GameState::Initializing,
            decision_budget: None,
        })
    }

    /// Treat any inline decision slower than `budget` as a timeout.
    pub fn with_decision_budget(mut self, budget: Duration) -> Self {
        self.decision_budget = Some(budget);
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Advance by one transition. Stepping a finished game is an engine fault.
    pub fn step(&mut self) -> Result<GameState, GameError> {
        self.state = match self.state {
            GameState::Initializing => GameState::Running { round: 1 },
            GameState::Running { round } => {
                self.play_round(round)?;
                if round < self.config.params.rounds {
                    GameState::Running { round: round + 1 }
                } else {
                    GameState::Finished
                }
            }
            GameState::Finished => return Err(crate::error::EngineFault::Finished.into()),
        };
        Ok(self.state)
    }

    /// Play to completion, checking `cancel` before every round.
    pub fn run(mut self, cancel: &CancelToken) -> Result<Ledger, GameError> {
        loop {
            if let GameState::Running { round } = self.state {
                if cancel.is_cancelled() {
                    log::debug!("game cancelled before round {}", round);
                    return Err(GameError::Cancelled { round });
                }
            }
            match self.step() {
                Ok(GameState::Finished) => return Ok(self.ledger),
                Ok(_) => {}
                Err(err) => {
                    if let GameError::Engine(fault) = &err {
                        log::error!("game aborted: {}", fault);
                    }
                    return Err(err);
                }
            }
        }
    }

    fn play_round(&mut self, round: u32) -> Result<(), GameError> {
        let players = self.config.params.players as usize;
        let history = self.ledger.visible_history(round);
        let mut actions = Vec::with_capacity(players);
        let mut faults = Vec::with_capacity(players);

        for (seat, policy) in self.seats.iter_mut().enumerate() {
            let view = DecisionView {
                params: &self.config.params,
                regime: self.config.regime,
                round,
                seat,
                history,
                rng: self.rng.for_decision(round, seat as u32),
            };

            let started = Instant::now();
            let outcome = policy.decide(&view).and_then(|action| match self.decision_budget {
                Some(budget) if started.elapsed() > budget => Err(DecisionFault::Timeout {
                    millis: budget.as_millis() as u64,
                }),
                _ => Ok(action),
            });

            match outcome {
                Ok(action) => {
                    actions.push(action);
                    faults.push(None);
                }
                Err(fault) => {
                    log::warn!("round {} seat {}: {}; substituting Defect", round, seat, fault);
                    actions.push(Action::Defect);
                    faults.push(Some(fault));
                }
            }
        }

        let payoffs = compute_payoffs(&actions, &self.config.params, self.config.regime)?;
        self.ledger.append(RoundRecord::new(round, actions, faults, payoffs))?;
        Ok(())
    }
}

/// Play one game of builtin or bytecode strategies, seat `i` running `strategies[i]`.
///
/// The game draws from stream `game_index` of `seed`, so the same
/// arguments always produce the same ledger.
pub fn play(
    config: &GameConfig,
    strategies: &[PlayerStrategy],
    seed: &[u8; 32],
    game_index: u64,
) -> Result<Ledger, GameError> {
    let mut seats: Vec<Box<dyn Policy>> = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        strategy.validate()?;
        seats.push(Box::new(Runtime::new(strategy.clone())));
    }
    let game = Game::new(*config, seats, SeededRng::new(seed, game_index))?;
    game.run(&CancelToken::new())
}
