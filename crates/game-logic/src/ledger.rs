//! Append-only history of one game

use serde::{Deserialize, Serialize};

use crate::error::{DecisionFault, EngineFault};
use crate::params::GameParameters;
use crate::payoff::{count_cooperators, Payoff};
use crate::strategy::Action;

/// Outcome of a single round. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    round: u32,
    actions: Vec<Action>,
    faults: Vec<Option<DecisionFault>>,
    cooperators: u32,
    payoffs: Vec<Payoff>,
}

impl RoundRecord {
    /// Build a record; the cooperator count is derived from `actions`.
    pub fn new(
        round: u32,
        actions: Vec<Action>,
        faults: Vec<Option<DecisionFault>>,
        payoffs: Vec<Payoff>,
    ) -> Self {
        let cooperators = count_cooperators(&actions);
        Self { round, actions, faults, cooperators, payoffs }
    }

    /// 1-based round index
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, seat: usize) -> Option<Action> {
        self.actions.get(seat).copied()
    }

    /// Per-seat fault annotations; `Some` marks a substituted Defect.
    pub fn faults(&self) -> &[Option<DecisionFault>] {
        &self.faults
    }

    pub fn fault(&self, seat: usize) -> Option<&DecisionFault> {
        self.faults.get(seat).and_then(Option::as_ref)
    }

    pub fn cooperators(&self) -> u32 {
        self.cooperators
    }

    pub fn payoffs(&self) -> &[Payoff] {
        &self.payoffs
    }

    fn check(&self, players: usize) -> Result<(), EngineFault> {
        for len in [self.actions.len(), self.faults.len(), self.payoffs.len()] {
            if len != players {
                return Err(EngineFault::RecordWidth {
                    round: self.round,
                    expected: players,
                    got: len,
                });
            }
        }
        let actual = count_cooperators(&self.actions);
        if actual != self.cooperators {
            return Err(EngineFault::CooperatorMismatch {
                round: self.round,
                reported: self.cooperators,
                actual,
            });
        }
        Ok(())
    }
}

/// Append-only ledger of round records for one game.
///
/// Records can only be added in strictly increasing round order and are
/// never handed out mutably.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ledger {
    players: usize,
    rounds: u32,
    records: Vec<RoundRecord>,
    totals: Vec<Payoff>,
}

impl Ledger {
    pub fn new(params: &GameParameters) -> Self {
        Self {
            players: params.players as usize,
            rounds: params.rounds,
            records: Vec::with_capacity(params.rounds as usize),
            totals: vec![Payoff::ZERO; params.players as usize],
        }
    }

    /// Append the next round. Restricted to the crate's orchestrator.
    pub(crate) fn append(&mut self, record: RoundRecord) -> Result<(), EngineFault> {
        let expected = self.records.len() as u32 + 1;
        if record.round != expected {
            return Err(EngineFault::OutOfOrder { expected, got: record.round });
        }
        if record.round > self.rounds {
            return Err(EngineFault::PastFinalRound { round: record.round, rounds: self.rounds });
        }
        record.check(self.players)?;

        let totals = self
            .totals
            .iter()
            .zip(record.payoffs())
            .map(|(total, p)| total.checked_add(*p))
            .collect::<Option<Vec<_>>>()
            .ok_or(EngineFault::PayoffOverflow)?;
        self.totals = totals;
        self.records.push(record);
        Ok(())
    }

    /// Everything a decision for round `round` may see: rounds `1..round`.
    pub fn visible_history(&self, round: u32) -> &[RoundRecord] {
        let visible = (round.saturating_sub(1) as usize).min(self.records.len());
        &self.records[..visible]
    }

    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn players(&self) -> usize {
        self.players
    }

    pub fn is_complete(&self) -> bool {
        self.records.len() as u32 == self.rounds
    }

    /// Cumulative payoff per seat
    pub fn totals(&self) -> &[Payoff] {
        &self.totals
    }

    /// Number of rounds each seat cooperated
    pub fn cooperations(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.players];
        for record in &self.records {
            for (count, a) in counts.iter_mut().zip(record.actions()) {
                if *a == Action::Cooperate {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Number of substituted decisions per seat
    pub fn faults(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.players];
        for record in &self.records {
            for (count, f) in counts.iter_mut().zip(record.faults()) {
                if f.is_some() {
                    *count += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GameConfig;

    use Action::{Cooperate as C, Defect as D};

    fn config() -> GameConfig {
        GameConfig::threshold(3, 3, 2, "2".parse().unwrap()).unwrap()
    }

    fn record(round: u32, actions: Vec<Action>) -> RoundRecord {
        let config = config();
        let payoffs = crate::payoff::compute_payoffs(&actions, &config.params, config.regime).unwrap();
        let faults = vec![None; actions.len()];
        RoundRecord::new(round, actions, faults, payoffs)
    }

    #[test]
    fn test_append_in_order() {
        let mut ledger = Ledger::new(&config().params);
        ledger.append(record(1, vec![C, C, D])).unwrap();
        ledger.append(record(2, vec![D, D, D])).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.is_complete());
        ledger.append(record(3, vec![C, C, C])).unwrap();
        assert!(ledger.is_complete());
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut ledger = Ledger::new(&config().params);
        assert_eq!(
            ledger.append(record(2, vec![C, C, C])),
            Err(EngineFault::OutOfOrder { expected: 1, got: 2 })
        );
        ledger.append(record(1, vec![C, C, C])).unwrap();
        assert_eq!(
            ledger.append(record(1, vec![C, C, C])),
            Err(EngineFault::OutOfOrder { expected: 2, got: 1 })
        );
    }

    #[test]
    fn test_rejects_past_final_round() {
        let mut ledger = Ledger::new(&config().params);
        for t in 1..=3 {
            ledger.append(record(t, vec![C, C, C])).unwrap();
        }
        assert_eq!(
            ledger.append(record(4, vec![C, C, C])),
            Err(EngineFault::PastFinalRound { round: 4, rounds: 3 })
        );
    }

    #[test]
    fn test_rejects_wrong_width() {
        let mut ledger = Ledger::new(&config().params);
        let bad = RoundRecord::new(1, vec![C, C], vec![None, None], vec![Payoff::ZERO; 2]);
        assert_eq!(
            ledger.append(bad),
            Err(EngineFault::RecordWidth { round: 1, expected: 3, got: 2 })
        );
    }

    #[test]
    fn test_visible_history_never_leaks_current_round() {
        let mut ledger = Ledger::new(&config().params);
        assert!(ledger.visible_history(1).is_empty());

        ledger.append(record(1, vec![C, C, D])).unwrap();
        ledger.append(record(2, vec![D, C, D])).unwrap();

        assert!(ledger.visible_history(1).is_empty());
        assert_eq!(ledger.visible_history(2).len(), 1);
        assert_eq!(ledger.visible_history(3).len(), 2);
        assert!(ledger.visible_history(3).iter().all(|r| r.round() < 3));
        // Asking for a later round never exposes more than exists
        assert_eq!(ledger.visible_history(10).len(), 2);
    }

    #[test]
    fn test_cooperator_count_is_derived() {
        let r = record(1, vec![C, D, C]);
        assert_eq!(r.cooperators(), 2);
    }

    #[test]
    fn test_totals_and_counts() {
        let mut ledger = Ledger::new(&config().params);
        ledger.append(record(1, vec![C, C, D])).unwrap(); // bonus: 2, 2, 3
        ledger.append(record(2, vec![C, D, D])).unwrap(); // miss: 0, 1, 1
        assert_eq!(ledger.totals(), vec![Payoff::whole(2), Payoff::whole(3), Payoff::whole(4)]);
        assert_eq!(ledger.cooperations(), vec![2, 1, 0]);
        assert_eq!(ledger.faults(), vec![0, 0, 0]);
    }

    #[test]
    fn test_total_overflow_rejects_round() {
        let mut ledger = Ledger::new(&config().params);
        let huge = RoundRecord::new(1, vec![C, C, C], vec![None; 3], vec![Payoff::whole(u64::MAX); 3]);
        ledger.append(huge).unwrap();

        let next = RoundRecord::new(2, vec![C, C, C], vec![None; 3], vec![Payoff::ONE; 3]);
        assert_eq!(ledger.append(next), Err(EngineFault::PayoffOverflow));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.totals(), vec![Payoff::whole(u64::MAX); 3]);
    }
}
