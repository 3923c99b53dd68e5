//! Aggregation and ranking of finished games
//!
//! Every seat of every finished game is one observation for the entrant in
//! that seat. Means and variances stream through Welford's update and merge
//! with Chan's formula, so partial aggregates built on different workers
//! combine into the same statistics. Ranking compares exact payoff sums.

use std::cmp::Ordering;
use std::fmt;

use game_logic::{GameConfig, Ledger, Payoff};
use serde::Serialize;

use crate::error::AggregateError;

/// A finished game: its ledger and which entrant sat in each seat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    /// Canonical game index; also the game's RNG stream
    pub index: u64,
    pub config: GameConfig,
    /// Entrant index per seat
    pub seats: Vec<usize>,
    pub ledger: Ledger,
    totals: Vec<Payoff>,
}

impl GameOutcome {
    pub fn new(index: u64, config: GameConfig, seats: Vec<usize>, ledger: Ledger) -> Self {
        let totals = ledger.totals().to_vec();
        Self { index, config, seats, ledger, totals }
    }

    /// Cumulative payoff per seat
    pub fn totals(&self) -> &[Payoff] {
        &self.totals
    }

    /// Highest seat total in the game
    pub fn best(&self) -> Payoff {
        self.totals.iter().copied().max().unwrap_or(Payoff::ZERO)
    }
}

/// Streaming statistics for one entrant
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accumulator {
    games: u64,
    mean: f64,
    m2: f64,
    total: Payoff,
    wins: u64,
    cooperations: u64,
    decisions: u64,
    faults: u64,
}

impl Accumulator {
    /// `None`, with nothing changed, when the exact total would overflow.
    fn observe(&mut self, total: Payoff, won: bool, cooperations: u64, decisions: u64, faults: u64) -> Option<()> {
        let sum = self.total.checked_add(total)?;
        self.games += 1;
        let x = total.to_f64();
        let delta = x - self.mean;
        self.mean += delta / self.games as f64;
        self.m2 += delta * (x - self.mean);

        self.total = sum;
        self.wins += u64::from(won);
        self.cooperations += cooperations;
        self.decisions += decisions;
        self.faults += faults;
        Some(())
    }

    /// Chan et al. pairwise combination
    fn merge(&mut self, other: &Accumulator) -> Option<()> {
        if other.games == 0 {
            return Some(());
        }
        if self.games == 0 {
            *self = other.clone();
            return Some(());
        }
        let sum = self.total.checked_add(other.total)?;
        let n_a = self.games as f64;
        let n_b = other.games as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;

        self.games += other.games;
        self.total = sum;
        self.wins += other.wins;
        self.cooperations += other.cooperations;
        self.decisions += other.decisions;
        self.faults += other.faults;
        Some(())
    }

    pub fn games(&self) -> u64 {
        self.games
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; zero below two games
    pub fn variance(&self) -> f64 {
        if self.games < 2 {
            0.0
        } else {
            self.m2 / (self.games - 1) as f64
        }
    }

    /// Exact sum of payoffs across games
    pub fn total(&self) -> Payoff {
        self.total
    }

    fn rate(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    }

    /// Compare exact means, `total / games`.
    fn cmp_mean(&self, other: &Accumulator) -> Ordering {
        match (self.games, other.games) {
            (0, 0) => Ordering::Equal,
            (0, _) => Payoff::ZERO.cmp(&other.total),
            (_, 0) => self.total.cmp(&Payoff::ZERO),
            _ => cmp_fraction(
                self.total.numer() as u128,
                self.total.denom() as u128 * self.games as u128,
                other.total.numer() as u128,
                other.total.denom() as u128 * other.games as u128,
            ),
        }
    }
}

/// Exact `a/b` against `c/d` by continued-fraction expansion, so no
/// product of the operands is ever formed. Denominators must be non-zero.
fn cmp_fraction(mut a: u128, mut b: u128, mut c: u128, mut d: u128) -> Ordering {
    loop {
        let order = (a / b).cmp(&(c / d));
        if order != Ordering::Equal {
            return order;
        }
        match (a % b, c % d) {
            (0, 0) => return Ordering::Equal,
            (0, _) => return Ordering::Less,
            (_, 0) => return Ordering::Greater,
            // equal integer parts: r1/b vs r2/d orders like d/r2 vs b/r1
            (r1, r2) => (a, b, c, d) = (d, r2, b, r1),
        }
    }
}

/// One entrant's row in the standings
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub id: String,
    pub games: u64,
    pub mean: f64,
    pub variance: f64,
    pub win_rate: f64,
    pub cooperation_rate: f64,
    pub faults: u64,
}

/// Final standings and game counts
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TournamentResult {
    pub standings: Vec<Standing>,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
}

impl TournamentResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn standing(&self, id: &str) -> Option<&Standing> {
        self.standings.iter().find(|s| s.id == id)
    }
}

impl fmt::Display for TournamentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:<20} {:>7} {:>10} {:>10} {:>6} {:>6} {:>6}",
            "rank", "entrant", "games", "mean", "variance", "win%", "coop%", "faults"
        )?;
        for s in &self.standings {
            writeln!(
                f,
                "{:>4}  {:<20} {:>7} {:>10.4} {:>10.4} {:>6.1} {:>6.1} {:>6}",
                s.rank,
                s.id,
                s.games,
                s.mean,
                s.variance,
                s.win_rate * 100.0,
                s.cooperation_rate * 100.0,
                s.faults
            )?;
        }
        write!(
            f,
            "{} games completed, {} cancelled, {} failed",
            self.completed, self.cancelled, self.failed
        )
    }
}

/// Per-entrant accumulators plus game counts
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregator {
    ids: Vec<String>,
    stats: Vec<Accumulator>,
    completed: u64,
    cancelled: u64,
    failed: u64,
}

impl Aggregator {
    pub fn new(ids: Vec<String>) -> Self {
        let stats = vec![Accumulator::default(); ids.len()];
        Self { ids, stats, completed: 0, cancelled: 0, failed: 0 }
    }

    /// Fold one finished game into the per-entrant statistics.
    ///
    /// All or nothing: a rejected game leaves the aggregator unchanged.
    pub fn record(&mut self, outcome: &GameOutcome) -> Result<(), AggregateError> {
        let best = outcome.best();
        let cooperations = outcome.ledger.cooperations();
        let faults = outcome.ledger.faults();
        let rounds = outcome.ledger.len() as u64;

        // an entrant may hold several seats
        let mut staged: Vec<(usize, Accumulator)> = Vec::with_capacity(outcome.seats.len());
        for (seat, &entrant) in outcome.seats.iter().enumerate() {
            let slot = match staged.iter().position(|(e, _)| *e == entrant) {
                Some(slot) => slot,
                None => {
                    let current = self
                        .stats
                        .get(entrant)
                        .ok_or(AggregateError::UnknownEntrant { game: outcome.index, entrant })?;
                    staged.push((entrant, current.clone()));
                    staged.len() - 1
                }
            };
            let total = outcome.totals.get(seat).copied().unwrap_or(Payoff::ZERO);
            staged[slot]
                .1
                .observe(
                    total,
                    total == best,
                    cooperations.get(seat).copied().unwrap_or(0) as u64,
                    rounds,
                    faults.get(seat).copied().unwrap_or(0) as u64,
                )
                .ok_or_else(|| AggregateError::Overflow { id: self.ids[entrant].clone() })?;
        }

        for (entrant, stats) in staged {
            self.stats[entrant] = stats;
        }
        self.completed += 1;
        Ok(())
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    /// Combine with an aggregator built over the same entrant list.
    ///
    /// All or nothing, like [`Aggregator::record`].
    pub fn merge(&mut self, other: &Aggregator) -> Result<(), AggregateError> {
        if self.ids != other.ids {
            return Err(AggregateError::EntrantMismatch);
        }
        let mut merged = self.stats.clone();
        for ((mine, theirs), id) in merged.iter_mut().zip(&other.stats).zip(&self.ids) {
            mine.merge(theirs).ok_or_else(|| AggregateError::Overflow { id: id.clone() })?;
        }

        self.stats = merged;
        self.completed += other.completed;
        self.cancelled += other.cancelled;
        self.failed += other.failed;
        Ok(())
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn accumulator(&self, entrant: usize) -> Option<&Accumulator> {
        self.stats.get(entrant)
    }

    /// Ranked rows: mean payoff descending, then entrant id ascending.
    pub fn standings(&self) -> Vec<Standing> {
        let mut order: Vec<usize> = (0..self.ids.len()).collect();
        order.sort_by(|&a, &b| {
            self.stats[b]
                .cmp_mean(&self.stats[a])
                .then_with(|| self.ids[a].cmp(&self.ids[b]))
        });

        order
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let s = &self.stats[e];
                Standing {
                    rank: i + 1,
                    id: self.ids[e].clone(),
                    games: s.games,
                    mean: s.mean,
                    variance: s.variance(),
                    win_rate: Accumulator::rate(s.wins, s.games),
                    cooperation_rate: Accumulator::rate(s.cooperations, s.decisions),
                    faults: s.faults,
                }
            })
            .collect()
    }

    pub fn finish(self) -> TournamentResult {
        TournamentResult {
            standings: self.standings(),
            completed: self.completed,
            cancelled: self.cancelled,
            failed: self.failed,
        }
    }
}

/// Aggregate a batch of finished games in one pass.
///
/// Games that cannot be recorded are logged and counted as failed.
pub fn aggregate<'a>(ids: Vec<String>, games: impl IntoIterator<Item = &'a GameOutcome>) -> TournamentResult {
    let mut aggregator = Aggregator::new(ids);
    for game in games {
        if let Err(err) = aggregator.record(game) {
            log::error!("game {} not recorded: {}", game.index, err);
            aggregator.record_failed();
        }
    }
    aggregator.finish()
}
