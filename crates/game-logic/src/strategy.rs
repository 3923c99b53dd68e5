//! Strategy definitions and execution
//!
//! Builtin policies are finite-state machines: a [`Phase`] plus a few
//! counters, advanced by the pure transition [`decide`]. Every knob the
//! strategy catalogue is ambiguous about (punishment length, whether an
//! exact-threshold count is a success, first/last round handling) is an
//! independent field of [`StrategyParams`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::params::GameParameters;
use crate::policy::DecisionView;
use crate::random::SeededRng;

/// An action in a social dilemma round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Cooperate,
    Defect,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Cooperate => write!(f, "C"),
            Action::Defect => write!(f, "D"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts `C`/`D`/`cooperate`/`defect`, any case, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "cooperate" => Ok(Action::Cooperate),
            "d" | "defect" => Ok(Action::Defect),
            _ => Err(s.to_string()),
        }
    }
}

/// Base strategy type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyBase {
    /// Always cooperate.
    AlwaysCooperate,
    /// Always defect.
    AlwaysDefect,
    /// Cooperate in round 1, then iff the last round met the cooperation threshold.
    Conditional,
    /// Cooperate until the first round that misses the threshold, then defect forever.
    GrimTrigger,
    /// Cooperate; after a miss defect for `punishment_length` rounds, then forgive.
    Punisher,
    /// Cooperate when this seat belongs to the round's rotation group.
    Rotation,
    /// Cooperate with probability `cooperate_percent`.
    Random,
    /// Cooperate while the recent cooperation rate stays at or above `cooperate_percent`.
    MovingAverage,
}

/// Fixed action for a distinguished round position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Override {
    /// Let the strategy decide.
    #[default]
    Strategy,
    Cooperate,
    Defect,
}

impl Override {
    fn action(self) -> Option<Action> {
        match self {
            Override::Strategy => None,
            Override::Cooperate => Some(Action::Cooperate),
            Override::Defect => Some(Action::Defect),
        }
    }
}

/// Strategy parameters for fine-tuning behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Round 1 handling
    pub first_round: Override,
    /// Round r handling
    pub last_round: Override,
    /// Bitmask over rounds 1-8 (bit 0 = round 1); a set bit forces Defect
    pub opening_defections: u8,
    /// Cooperator count a round must reach to count as a success.
    /// Defaults to `m` when the game has one, else `⌈n/2⌉`.
    pub cooperate_threshold: Option<u32>,
    /// Whether a count exactly at the threshold is a success
    pub threshold_inclusive: bool,
    /// Forced-Defect rounds after a miss (Punisher)
    pub punishment_length: u8,
    /// Clear an ongoing punishment as soon as a round meets the threshold
    pub forgive_on_cooperation: bool,
    /// Cooperation probability (Random) or required rate (MovingAverage), 0-100
    pub cooperate_percent: u8,
    /// Rounds averaged by MovingAverage
    pub window: u8,
    /// Seats cooperating per round (Rotation); defaults like `cooperate_threshold`
    pub rotation_group: Option<u32>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            first_round: Override::Strategy,
            last_round: Override::Strategy,
            opening_defections: 0,
            cooperate_threshold: None,
            threshold_inclusive: true,
            punishment_length: 1,
            forgive_on_cooperation: false,
            cooperate_percent: 50,
            window: 3,
            rotation_group: None,
        }
    }
}

impl StrategyParams {
    /// Cooperator count that counts as a success for this game
    pub fn threshold_for(&self, game: &GameParameters) -> u32 {
        self.cooperate_threshold
            .or(game.threshold)
            .unwrap_or_else(|| game.players.div_ceil(2))
    }

    /// Did a round with `cooperators` cooperators meet the threshold?
    pub fn is_success(&self, game: &GameParameters, cooperators: u32) -> bool {
        let threshold = self.threshold_for(game);
        if self.threshold_inclusive {
            cooperators >= threshold
        } else {
            cooperators > threshold
        }
    }
}

/// Complete strategy with base type and parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strategy {
    pub base: StrategyBase,
    #[serde(default)]
    pub params: StrategyParams,
}

impl Strategy {
    /// Create a new strategy with default parameters
    pub fn new(base: StrategyBase) -> Self {
        Self { base, params: StrategyParams::default() }
    }

    /// Create with custom parameters
    pub fn with_params(base: StrategyBase, params: StrategyParams) -> Self {
        Self { base, params }
    }
}

/// Named state of a builtin machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Default branch of the strategy
    #[default]
    Normal,
    /// Forced Defect for `remaining` more rounds, this one included
    Punishing { remaining: u8 },
    /// Forced Defect for the rest of the game
    Grim,
}

/// Private memory of one builtin policy instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineState {
    phase: Phase,
    /// Last round spent punishing; misses up to it cannot re-trigger.
    punished_through: u32,
    punishments_served: u32,
    triggers: u32,
    rounds_seen: u32,
}

impl MachineState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Forced-Defect rounds played while punishing
    pub fn punishments_served(&self) -> u32 {
        self.punishments_served
    }

    /// How many misses started a punishment or the grim phase
    pub fn triggers(&self) -> u32 {
        self.triggers
    }

    pub fn rounds_seen(&self) -> u32 {
        self.rounds_seen
    }
}

/// Execute a strategy for one round.
///
/// Pure transition: the same strategy, view, state and rng stream always
/// produce the same action and successor state.
pub fn decide(
    strategy: &Strategy,
    view: &DecisionView<'_>,
    state: &MachineState,
    rng: &mut SeededRng,
) -> (Action, MachineState) {
    let params = &strategy.params;
    let mut next = state.clone();
    next.rounds_seen = view.history.len() as u32;

    if let Some(last) = view.history.last() {
        let success = params.is_success(view.params, last.cooperators());
        next.phase = match (strategy.base, state.phase) {
            (_, Phase::Grim) => Phase::Grim,
            (StrategyBase::GrimTrigger, Phase::Normal) if !success => {
                next.triggers += 1;
                Phase::Grim
            }
            (StrategyBase::Punisher, Phase::Punishing { .. })
                if params.forgive_on_cooperation && success =>
            {
                Phase::Normal
            }
            (StrategyBase::Punisher, Phase::Normal)
                if !success
                    && params.punishment_length > 0
                    && last.round() > state.punished_through =>
            {
                next.triggers += 1;
                Phase::Punishing { remaining: params.punishment_length }
            }
            (_, phase) => phase,
        };
    }

    let action = match next.phase {
        Phase::Grim => Action::Defect,
        Phase::Punishing { remaining } => {
            next.punished_through = view.round;
            next.punishments_served += 1;
            next.phase = if remaining > 1 {
                Phase::Punishing { remaining: remaining - 1 }
            } else {
                Phase::Normal
            };
            Action::Defect
        }
        Phase::Normal => positional_override(params, view)
            .unwrap_or_else(|| default_action(strategy, view, rng)),
    };

    (action, next)
}

/// First/last round overrides and the opening-defection mask
fn positional_override(params: &StrategyParams, view: &DecisionView<'_>) -> Option<Action> {
    if view.round == 1 {
        if let Some(action) = params.first_round.action() {
            return Some(action);
        }
    }
    if view.round == view.params.rounds {
        if let Some(action) = params.last_round.action() {
            return Some(action);
        }
    }
    if (1..=8).contains(&view.round) && (params.opening_defections >> (view.round - 1)) & 1 == 1 {
        return Some(Action::Defect);
    }
    None
}

fn default_action(strategy: &Strategy, view: &DecisionView<'_>, rng: &mut SeededRng) -> Action {
    let params = &strategy.params;
    match strategy.base {
        StrategyBase::AlwaysCooperate => Action::Cooperate,
        StrategyBase::AlwaysDefect => Action::Defect,
        StrategyBase::Conditional => match view.history.last() {
            None => Action::Cooperate,
            Some(last) if params.is_success(view.params, last.cooperators()) => Action::Cooperate,
            Some(_) => Action::Defect,
        },
        // Outside their forced phases both cooperate
        StrategyBase::GrimTrigger | StrategyBase::Punisher => Action::Cooperate,
        StrategyBase::Rotation => rotation_action(params, view),
        StrategyBase::Random => {
            if rng.next_percent() < params.cooperate_percent {
                Action::Cooperate
            } else {
                Action::Defect
            }
        }
        StrategyBase::MovingAverage => moving_average_action(params, view),
    }
}

/// Round-robin schedule: in round t the `g` seats starting at `(t−1)·g mod n` cooperate.
fn rotation_action(params: &StrategyParams, view: &DecisionView<'_>) -> Action {
    let n = view.params.players.max(1) as u64;
    let group = params
        .rotation_group
        .or(view.params.threshold)
        .unwrap_or_else(|| view.params.players.div_ceil(2))
        .clamp(1, view.params.players.max(1)) as u64;

    let start = (view.round.saturating_sub(1) as u64 * group) % n;
    let offset = (view.seat as u64 % n + n - start) % n;
    if offset < group {
        Action::Cooperate
    } else {
        Action::Defect
    }
}

fn moving_average_action(params: &StrategyParams, view: &DecisionView<'_>) -> Action {
    let window = params.window.max(1) as usize;
    let recent = &view.history[view.history.len().saturating_sub(window)..];
    if recent.is_empty() {
        return Action::Cooperate;
    }

    let cooperations: u64 = recent.iter().map(|r| r.cooperators() as u64).sum();
    let slots = recent.len() as u64 * view.params.players as u64;
    if cooperations * 100 >= params.cooperate_percent as u64 * slots {
        Action::Cooperate
    } else {
        Action::Defect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Strategy;
    use crate::ledger::RoundRecord;
    use crate::params::{GameConfig, Regime};
    use crate::payoff::compute_payoffs;
    use proptest::prelude::*;
    use proptest::strategy::Strategy as _;

    use Action::{Cooperate as C, Defect as D};

    fn crd(n: u32, rounds: u32, m: u32) -> GameConfig {
        GameConfig::threshold(n, rounds, m, "2".parse().unwrap()).unwrap()
    }

    /// Record where the first `cooperators` seats cooperated
    fn record(config: &GameConfig, round: u32, cooperators: u32) -> RoundRecord {
        let n = config.params.players;
        let actions: Vec<Action> = (0..n).map(|i| if i < cooperators { C } else { D }).collect();
        let payoffs = compute_payoffs(&actions, &config.params, config.regime).unwrap();
        RoundRecord::new(round, actions, vec![None; n as usize], payoffs)
    }

    fn history(config: &GameConfig, counts: &[u32]) -> Vec<RoundRecord> {
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| record(config, i as u32 + 1, *c))
            .collect()
    }

    fn view<'a>(config: &'a GameConfig, history: &'a [RoundRecord], seat: usize) -> DecisionView<'a> {
        DecisionView {
            params: &config.params,
            regime: config.regime,
            round: history.len() as u32 + 1,
            seat,
            history,
            rng: SeededRng::new(&[42u8; 32], 0).for_decision(history.len() as u32 + 1, seat as u32),
        }
    }

    /// Thread state through every prefix of `counts`, returning each round's action
    fn play_through(strategy: &Strategy, config: &GameConfig, seat: usize, counts: &[u32]) -> Vec<(Action, MachineState)> {
        let full = history(config, counts);
        let mut state = MachineState::default();
        let mut out = Vec::new();
        for t in 0..=full.len() {
            let v = view(config, &full[..t], seat);
            let mut rng = v.rng.clone();
            let (action, next) = decide(strategy, &v, &state, &mut rng);
            out.push((action, next.clone()));
            state = next;
        }
        out
    }

    fn actions(strategy: &Strategy, config: &GameConfig, counts: &[u32]) -> Vec<Action> {
        play_through(strategy, config, 0, counts).into_iter().map(|(a, _)| a).collect()
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("C".parse::<Action>(), Ok(C));
        assert_eq!(" defect\n".parse::<Action>(), Ok(D));
        assert_eq!("Cooperate".parse::<Action>(), Ok(C));
        assert_eq!("maybe".parse::<Action>(), Err("maybe".to_string()));
        assert_eq!("".parse::<Action>(), Err(String::new()));
    }

    #[test]
    fn test_unconditional() {
        let config = crd(4, 10, 3);
        assert!(actions(&Strategy::new(StrategyBase::AlwaysCooperate), &config, &[0, 0, 0])
            .iter()
            .all(|a| *a == C));
        assert!(actions(&Strategy::new(StrategyBase::AlwaysDefect), &config, &[4, 4, 4])
            .iter()
            .all(|a| *a == D));
    }

    #[test]
    fn test_conditional_follows_threshold() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::new(StrategyBase::Conditional);
        // round 1 cooperate, then mirror whether the last round reached m = 3
        assert_eq!(actions(&strategy, &config, &[3, 2, 4]), vec![C, C, D, C]);
    }

    #[test]
    fn test_exclusive_threshold() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::Conditional,
            StrategyParams { threshold_inclusive: false, ..Default::default() },
        );
        // exactly m is no longer a success
        assert_eq!(actions(&strategy, &config, &[3, 4]), vec![C, D, C]);
    }

    #[test]
    fn test_explicit_threshold_overrides_m() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::Conditional,
            StrategyParams { cooperate_threshold: Some(1), ..Default::default() },
        );
        assert_eq!(actions(&strategy, &config, &[1, 0]), vec![C, C, D]);
    }

    #[test]
    fn test_linear_default_threshold_is_half() {
        let config = GameConfig::linear(5, 10, "2".parse().unwrap()).unwrap();
        let strategy = Strategy::new(StrategyBase::Conditional);
        let h = {
            let mut out = Vec::new();
            for (i, c) in [3u32, 2].iter().enumerate() {
                out.push(record(&config, i as u32 + 1, *c));
            }
            out
        };
        assert_eq!(config.regime, Regime::Linear);
        let mut state = MachineState::default();
        let mut got = Vec::new();
        for t in 0..=h.len() {
            let v = view(&config, &h[..t], 0);
            let (a, s) = decide(&strategy, &v, &state, &mut v.rng.clone());
            got.push(a);
            state = s;
        }
        // ⌈5/2⌉ = 3
        assert_eq!(got, vec![C, C, D]);
    }

    #[test]
    fn test_grim_trigger() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::new(StrategyBase::GrimTrigger);
        let played = play_through(&strategy, &config, 0, &[4, 2, 4, 4]);
        let acts: Vec<_> = played.iter().map(|(a, _)| *a).collect();
        assert_eq!(acts, vec![C, C, D, D, D]);
        assert_eq!(played.last().unwrap().1.phase(), Phase::Grim);
        assert_eq!(played.last().unwrap().1.triggers(), 1);
    }

    #[test]
    fn test_punisher_single_round() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::new(StrategyBase::Punisher);
        // miss in round 2 → defect round 3 → back to cooperating in round 4
        // even though round 3 (its own punishment round) also missed
        assert_eq!(actions(&strategy, &config, &[4, 1, 2, 4]), vec![C, C, D, C, C]);
    }

    #[test]
    fn test_punisher_retriggers_on_new_miss() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::new(StrategyBase::Punisher);
        // rounds: 1 miss → punish 2; 2 is punishment; 3 coop round misses again → punish 4
        assert_eq!(actions(&strategy, &config, &[2, 2, 2]), vec![C, D, C, D]);
    }

    #[test]
    fn test_punisher_forgiveness_cuts_short() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::Punisher,
            StrategyParams { punishment_length: 3, forgive_on_cooperation: true, ..Default::default() },
        );
        // miss at round 1 → punish from round 2; round 2 meets the threshold → forgiven at round 3
        assert_eq!(actions(&strategy, &config, &[1, 3, 4]), vec![C, D, C, C]);

        let strict = Strategy::with_params(
            StrategyBase::Punisher,
            StrategyParams { punishment_length: 3, ..Default::default() },
        );
        assert_eq!(actions(&strict, &config, &[1, 3, 4]), vec![C, D, D, D]);
    }

    #[test]
    fn test_zero_punishment_never_defects() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::Punisher,
            StrategyParams { punishment_length: 0, ..Default::default() },
        );
        assert!(actions(&strategy, &config, &[0, 0, 0]).iter().all(|a| *a == C));
    }

    #[test]
    fn test_first_and_last_round_overrides() {
        let config = crd(4, 3, 3);
        let strategy = Strategy::with_params(
            StrategyBase::AlwaysCooperate,
            StrategyParams {
                first_round: Override::Defect,
                last_round: Override::Defect,
                ..Default::default()
            },
        );
        assert_eq!(actions(&strategy, &config, &[4, 4]), vec![D, C, D]);
    }

    #[test]
    fn test_grim_beats_last_round_override() {
        let config = crd(4, 3, 3);
        let strategy = Strategy::with_params(
            StrategyBase::GrimTrigger,
            StrategyParams { last_round: Override::Cooperate, ..Default::default() },
        );
        assert_eq!(actions(&strategy, &config, &[0, 4]), vec![C, D, D]);
    }

    #[test]
    fn test_opening_defections() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::AlwaysCooperate,
            StrategyParams { opening_defections: 0b0000_0101, ..Default::default() },
        );
        assert_eq!(actions(&strategy, &config, &[4, 4, 4]), vec![D, C, D, C]);
    }

    #[test]
    fn test_rotation_schedule() {
        let config = crd(4, 10, 2);
        let strategy = Strategy::new(StrategyBase::Rotation);
        // group m = 2: round 1 seats {0,1}, round 2 {2,3}, round 3 {0,1}
        let per_seat: Vec<Vec<Action>> = (0..4)
            .map(|seat| play_through(&strategy, &config, seat, &[0, 0]).into_iter().map(|(a, _)| a).collect())
            .collect();
        assert_eq!(per_seat[0], vec![C, D, C]);
        assert_eq!(per_seat[1], vec![C, D, C]);
        assert_eq!(per_seat[2], vec![D, C, D]);
        assert_eq!(per_seat[3], vec![D, C, D]);
    }

    #[test]
    fn test_random_extremes() {
        let config = crd(4, 30, 3);
        let never = Strategy::with_params(
            StrategyBase::Random,
            StrategyParams { cooperate_percent: 0, ..Default::default() },
        );
        let always = Strategy::with_params(
            StrategyBase::Random,
            StrategyParams { cooperate_percent: 100, ..Default::default() },
        );
        let counts = [2u32; 20];
        assert!(actions(&never, &config, &counts).iter().all(|a| *a == D));
        assert!(actions(&always, &config, &counts).iter().all(|a| *a == C));
    }

    #[test]
    fn test_random_is_replayable() {
        let config = crd(4, 30, 3);
        let strategy = Strategy::new(StrategyBase::Random);
        let counts = [2u32; 20];
        assert_eq!(actions(&strategy, &config, &counts), actions(&strategy, &config, &counts));
    }

    #[test]
    fn test_moving_average() {
        let config = crd(4, 10, 3);
        let strategy = Strategy::with_params(
            StrategyBase::MovingAverage,
            StrategyParams { window: 2, cooperate_percent: 50, ..Default::default() },
        );
        // windows: [] → C; [4] 100% → C; [4,0] 50% → C; [0,1] 12.5% → D; [1,4] 62.5% → C
        assert_eq!(actions(&strategy, &config, &[4, 0, 1, 4]), vec![C, C, C, D, C]);
    }

    #[test]
    fn test_strategy_json() {
        let json = r#"{"base":"Punisher","params":{"punishment_length":2,"last_round":"Defect"}}"#;
        let strategy: Strategy = serde_json::from_str(json).unwrap();
        assert_eq!(strategy.base, StrategyBase::Punisher);
        assert_eq!(strategy.params.punishment_length, 2);
        assert_eq!(strategy.params.last_round, Override::Defect);
        assert_eq!(strategy.params.cooperate_percent, 50);

        let bare: Strategy = serde_json::from_str(r#"{"base":"Rotation"}"#).unwrap();
        assert_eq!(bare, Strategy::new(StrategyBase::Rotation));
    }

    fn any_counts(
        n: u32,
        len: impl Into<prop::collection::SizeRange>,
    ) -> impl proptest::strategy::Strategy<Value = Vec<u32>> {
        prop::collection::vec(0..=n, len)
    }

    proptest! {
        #[test]
        fn prop_grim_persists(counts in any_counts(5, 1..30)) {
            let config = crd(5, 40, 3);
            let strategy = Strategy::new(StrategyBase::GrimTrigger);
            let played = play_through(&strategy, &config, 0, &counts);

            let mut grim = false;
            for (action, state) in &played {
                if grim {
                    prop_assert_eq!(*action, D);
                    prop_assert_eq!(state.phase(), Phase::Grim);
                }
                grim |= state.phase() == Phase::Grim;
            }
        }

        #[test]
        fn prop_punishment_lasts_exactly_p(
            p in 1u8..6,
            calm in 0usize..5,
            noise in any_counts(5, 8),
        ) {
            let config = crd(5, 40, 3);
            let strategy = Strategy::with_params(
                StrategyBase::Punisher,
                StrategyParams { punishment_length: p, ..Default::default() },
            );

            // calm rounds, then one miss, then arbitrary rounds while punishing
            let mut counts = vec![5u32; calm];
            counts.push(0);
            counts.extend(noise.iter().take(p as usize));
            let acts = actions(&strategy, &config, &counts);

            let trigger_decision = calm + 1;
            for a in &acts[..trigger_decision] {
                prop_assert_eq!(*a, C);
            }
            for a in &acts[trigger_decision..trigger_decision + p as usize] {
                prop_assert_eq!(*a, D);
            }
            prop_assert_eq!(acts[trigger_decision + p as usize], C);
        }

        #[test]
        fn prop_rotation_is_fair(n in 2u32..9, rounds in 2u32..40, group_seed in 0u32..100) {
            let group = 1 + group_seed % (n - 1).max(1);
            let config = GameConfig::linear(n, rounds, "3/2".parse().unwrap()).unwrap();
            let strategy = Strategy::with_params(
                StrategyBase::Rotation,
                StrategyParams { rotation_group: Some(group), ..Default::default() },
            );

            let empty: Vec<RoundRecord> = Vec::new();
            let mut totals = vec![0u32; n as usize];
            for round in 1..=rounds {
                let mut per_round = 0;
                for seat in 0..n as usize {
                    let mut v = view(&config, &empty, seat);
                    v.round = round;
                    let (a, _) = decide(&strategy, &v, &MachineState::default(), &mut v.rng.clone());
                    if a == C {
                        totals[seat] += 1;
                        per_round += 1;
                    }
                }
                prop_assert_eq!(per_round, group);
            }

            let max = *totals.iter().max().unwrap();
            let min = *totals.iter().min().unwrap();
            prop_assert!(max - min <= 1, "totals {:?}", totals);
        }

        #[test]
        fn prop_decide_is_replayable(counts in any_counts(5, 0..20), base_idx in 0usize..8) {
            let bases = [
                StrategyBase::AlwaysCooperate, StrategyBase::AlwaysDefect,
                StrategyBase::Conditional, StrategyBase::GrimTrigger,
                StrategyBase::Punisher, StrategyBase::Rotation,
                StrategyBase::Random, StrategyBase::MovingAverage,
            ];
            let config = crd(5, 40, 3);
            let strategy = Strategy::new(bases[base_idx]);
            prop_assert_eq!(
                play_through(&strategy, &config, 2, &counts),
                play_through(&strategy, &config, 2, &counts)
            );
        }
    }
}
