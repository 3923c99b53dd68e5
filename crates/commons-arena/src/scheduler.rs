//! Tournament scheduler
//!
//! Expands a configuration into a flat list of games, permutes the
//! dispatch order, and plays the games on a rayon pool. Finished games
//! are folded into a shared aggregator as they complete.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use game_logic::{
    homogeneous_groups, permute_order, rotate_seats, round_robin_groups, sampled_groups, CancelToken, ConfigError,
    Game, GameConfig, GameError, Isolated, PlayerStrategy, Policy, Runtime, SeededRng,
};
use rayon::prelude::*;

use crate::aggregate::{Aggregator, GameOutcome, Standing, TournamentResult};
use crate::config::{default_workers, validate_layout, Grouping, TournamentConfig};
use crate::error::TournamentError;

type PolicyFactory = Arc<dyn Fn() -> Box<dyn Policy> + Send + Sync>;

enum Source {
    Strategy(PlayerStrategy),
    External(PolicyFactory),
}

/// A named participant. Each game gets a fresh policy instance.
pub struct Entrant {
    id: String,
    source: Source,
}

impl Entrant {
    /// A builtin or bytecode strategy
    pub fn strategy(id: impl Into<String>, strategy: impl Into<PlayerStrategy>) -> Self {
        Self { id: id.into(), source: Source::Strategy(strategy.into()) }
    }

    /// An external policy built fresh for every game by `factory`.
    ///
    /// With a decision timeout configured it runs on an isolated worker thread.
    pub fn external<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Policy> + Send + Sync + 'static,
    {
        Self { id: id.into(), source: Source::External(Arc::new(factory)) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn instantiate(&self, timeout: Option<Duration>) -> Box<dyn Policy> {
        match &self.source {
            Source::Strategy(strategy) => Box::new(Runtime::new(strategy.clone())),
            Source::External(factory) => {
                let policy = factory();
                let Some(timeout) = timeout else {
                    return policy;
                };
                match Isolated::spawn(policy, timeout) {
                    Ok(isolated) => Box::new(isolated),
                    Err(err) => {
                        log::warn!("could not isolate {}: {}; deciding inline", self.id, err);
                        factory()
                    }
                }
            }
        }
    }
}

/// One scheduled game
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GamePlan {
    /// Canonical position in the schedule; selects the game's RNG stream
    pub index: u64,
    pub config: GameConfig,
    /// Entrant index per seat
    pub seats: Vec<usize>,
    pub trial: u32,
}

/// Snapshot handed to the progress callback after every finished game
#[derive(Clone, Debug)]
pub struct Progress {
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub total: u64,
    pub standings: Vec<Standing>,
}

/// A runnable tournament
pub struct Tournament {
    seed: [u8; 32],
    games: Vec<GameConfig>,
    entrants: Vec<Entrant>,
    grouping: Grouping,
    trials: u32,
    workers: usize,
    decision_timeout: Option<Duration>,
}

impl Tournament {
    /// Defaults: round-robin, one trial, one worker per core, no timeout.
    pub fn new(seed: [u8; 32], games: Vec<GameConfig>, entrants: Vec<Entrant>) -> Self {
        Self {
            seed,
            games,
            entrants,
            grouping: Grouping::default(),
            trials: 1,
            workers: default_workers(),
            decision_timeout: None,
        }
    }

    pub fn from_config(config: &TournamentConfig) -> Result<Self, TournamentError> {
        config.validate()?;
        let entrants = config
            .entrants
            .iter()
            .map(|e| Entrant::strategy(e.id.clone(), e.strategy.clone()))
            .collect();
        let mut tournament = Self::new(*config.seed.bytes(), config.games.clone(), entrants)
            .with_grouping(config.grouping)
            .with_trials(config.trials)
            .with_workers(config.workers);
        if let Some(ms) = config.decision_timeout_ms {
            tournament = tournament.with_decision_timeout(Duration::from_millis(ms));
        }
        Ok(tournament)
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = Some(timeout);
        self
    }

    pub fn entrants(&self) -> impl Iterator<Item = &str> {
        self.entrants.iter().map(Entrant::id)
    }

    /// Structural checks; returns the number of games that will be scheduled.
    pub fn validate(&self) -> Result<u64, ConfigError> {
        for entrant in &self.entrants {
            if let Source::Strategy(strategy) = &entrant.source {
                strategy.validate()?;
            }
        }
        validate_layout(&self.games, self.entrants(), self.grouping, self.trials, self.workers)
    }

    /// Every game in dispatch order.
    ///
    /// Canonical order is game configuration, then trial, then group; each
    /// plan keeps its canonical index so the permuted dispatch order never
    /// changes what a game plays.
    pub fn plan(&self) -> Vec<GamePlan> {
        let entrants = self.entrants.len() as u32;
        let mut plans = Vec::new();

        for (config_index, config) in self.games.iter().enumerate() {
            let seats = config.params.players;
            let groups = match self.grouping {
                Grouping::RoundRobin { self_play } => {
                    let mut groups = round_robin_groups(entrants, seats);
                    if self_play {
                        groups.extend(homogeneous_groups(entrants, seats));
                    }
                    groups
                }
                Grouping::Sampled { games_per_entrant } => {
                    sampled_groups(entrants, seats, games_per_entrant, &config_seed(&self.seed, config_index))
                }
            };

            for trial in 0..self.trials {
                for group in &groups {
                    plans.push(GamePlan {
                        index: plans.len() as u64,
                        config: *config,
                        seats: rotate_seats(group, trial).into_iter().map(|e| e as usize).collect(),
                        trial,
                    });
                }
            }
        }

        permute_order(plans.len() as u32, &self.seed)
            .into_iter()
            .map(|i| plans[i as usize].clone())
            .collect()
    }

    pub fn run(&self, cancel: &CancelToken) -> Result<TournamentResult, TournamentError> {
        self.run_with_progress(cancel, |_| {})
    }

    /// Play every game, calling `progress` after each one finishes.
    pub fn run_with_progress<F>(&self, cancel: &CancelToken, progress: F) -> Result<TournamentResult, TournamentError>
    where
        F: Fn(&Progress) + Sync,
    {
        let total = self.validate()?;
        let plans = self.plan();
        log::info!(
            "tournament: {} games, {} entrants, {} workers",
            total,
            self.entrants.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("arena-worker-{}", i))
            .build()?;

        let ids = self.entrants().map(str::to_string).collect();
        let shared = Mutex::new(Aggregator::new(ids));

        pool.install(|| {
            plans.par_iter().for_each(|plan| {
                let result = if cancel.is_cancelled() {
                    Err(GameError::Cancelled { round: 0 })
                } else {
                    self.play(plan, cancel)
                };

                let snapshot = {
                    let mut aggregator = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    match result {
                        Ok(outcome) => match aggregator.record(&outcome) {
                            Ok(()) => log::debug!("game {} finished: {:?}", outcome.index, outcome.totals()),
                            Err(err) => {
                                log::error!("game {} not recorded: {}", outcome.index, err);
                                aggregator.record_failed();
                            }
                        },
                        Err(GameError::Cancelled { .. }) => aggregator.record_cancelled(),
                        Err(err) => {
                            log::error!("game {} failed: {}", plan.index, err);
                            aggregator.record_failed();
                        }
                    }
                    Progress {
                        completed: aggregator.completed(),
                        cancelled: aggregator.cancelled(),
                        failed: aggregator.failed(),
                        total,
                        standings: aggregator.standings(),
                    }
                };
                progress(&snapshot);
            });
        });

        let aggregator = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        let result = aggregator.finish();
        log::info!(
            "tournament finished: {} completed, {} cancelled, {} failed",
            result.completed,
            result.cancelled,
            result.failed
        );
        Ok(result)
    }

    fn play(&self, plan: &GamePlan, cancel: &CancelToken) -> Result<GameOutcome, GameError> {
        let seats: Vec<Box<dyn Policy>> = plan
            .seats
            .iter()
            .map(|&e| self.entrants[e].instantiate(self.decision_timeout))
            .collect();

        let mut game = Game::new(plan.config, seats, SeededRng::new(&self.seed, plan.index))?;
        if let Some(budget) = self.decision_timeout {
            game = game.with_decision_budget(budget);
        }
        let ledger = game.run(cancel)?;
        Ok(GameOutcome::new(plan.index, plan.config, plan.seats.clone(), ledger))
    }
}

/// Per-configuration seed for sampled groupings
fn config_seed(seed: &[u8; 32], config_index: usize) -> [u8; 32] {
    let mut derived = *seed;
    for (byte, salt) in derived[24..].iter_mut().zip((config_index as u64).to_le_bytes()) {
        *byte ^= salt;
    }
    derived
}
