//! Policies: anything that can choose an action for one seat
//!
//! A policy sees a [`DecisionView`] holding the game parameters, its own seat
//! and the rounds strictly before the current one. Builtin machines and
//! bytecode programs run through [`Runtime`]; externally supplied decision
//! functions are wrapped by [`External`] or [`Stateful`], and any policy can
//! be moved onto its own worker thread with [`Isolated`] to bound how long
//! a decision may take.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DecisionFault};
use crate::ledger::RoundRecord;
use crate::params::{GameParameters, Regime};
use crate::random::SeededRng;
use crate::strategy::{self, Action, MachineState, Strategy};
use crate::vm::{execute_bytecode, validate_bytecode};

/// Everything a seat may observe when deciding round `round`.
#[derive(Clone, Debug)]
pub struct DecisionView<'a> {
    pub params: &'a GameParameters,
    pub regime: Regime,
    /// 1-based round being decided
    pub round: u32,
    pub seat: usize,
    /// Rounds `1..round`, oldest first
    pub history: &'a [RoundRecord],
    /// This seat's private stream for this round
    pub rng: SeededRng,
}

impl DecisionView<'_> {
    pub fn last(&self) -> Option<&RoundRecord> {
        self.history.last()
    }

    /// This seat's past actions, oldest first
    pub fn own_actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.history.iter().filter_map(move |r| r.action(self.seat))
    }

    /// Rounds remaining after the current one
    pub fn rounds_left(&self) -> u32 {
        self.params.rounds.saturating_sub(self.round)
    }
}

/// A decision-maker bound to one seat for one game.
pub trait Policy: Send {
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault>;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault> {
        (**self).decide(view)
    }
}

/// A seat's strategy: a builtin machine or a custom bytecode program
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStrategy {
    Builtin(Strategy),
    Custom(Vec<u8>),
}

impl PlayerStrategy {
    /// Reject bytecode that could never run; builtins are always valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PlayerStrategy::Builtin(_) => Ok(()),
            PlayerStrategy::Custom(code) => Ok(validate_bytecode(code)?),
        }
    }
}

impl From<Strategy> for PlayerStrategy {
    fn from(strategy: Strategy) -> Self {
        PlayerStrategy::Builtin(strategy)
    }
}

/// Runs a [`PlayerStrategy`], carrying a builtin machine's state between rounds.
#[derive(Clone, Debug)]
pub struct Runtime {
    strategy: PlayerStrategy,
    state: MachineState,
}

impl Runtime {
    pub fn new(strategy: PlayerStrategy) -> Self {
        Self { strategy, state: MachineState::default() }
    }

    pub fn strategy(&self) -> &PlayerStrategy {
        &self.strategy
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }
}

impl From<PlayerStrategy> for Runtime {
    fn from(strategy: PlayerStrategy) -> Self {
        Self::new(strategy)
    }
}

impl Policy for Runtime {
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault> {
        let mut rng = view.rng.clone();
        match &self.strategy {
            PlayerStrategy::Builtin(strategy) => {
                let (action, next) = strategy::decide(strategy, view, &self.state, &mut rng);
                self.state = next;
                Ok(action)
            }
            PlayerStrategy::Custom(code) => execute_bytecode(code, view, &mut rng)
                .map_err(|fault| DecisionFault::InvalidAction { raw: fault.to_string() }),
        }
    }
}

/// Wraps a decision function `(params, history) → text`.
///
/// The text must parse as an [`Action`]; anything else is an invalid action.
pub struct External<F> {
    respond: F,
}

impl<F> External<F>
where
    F: FnMut(&GameParameters, &[RoundRecord]) -> String + Send,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

impl<F> Policy for External<F>
where
    F: FnMut(&GameParameters, &[RoundRecord]) -> String + Send,
{
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault> {
        (self.respond)(view.params, view.history)
            .parse()
            .map_err(|raw| DecisionFault::InvalidAction { raw })
    }
}

/// Wraps a pure transition `(params, history, state) → (text, state′)`.
///
/// The successor state is kept even when the text is not a valid action.
pub struct Stateful<S, F> {
    state: S,
    respond: F,
}

impl<S, F> Stateful<S, F>
where
    S: Send,
    F: FnMut(&GameParameters, &[RoundRecord], &S) -> (String, S) + Send,
{
    pub fn new(initial: S, respond: F) -> Self {
        Self { state: initial, respond }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S, F> Policy for Stateful<S, F>
where
    S: Send,
    F: FnMut(&GameParameters, &[RoundRecord], &S) -> (String, S) + Send,
{
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault> {
        let (raw, next) = (self.respond)(view.params, view.history, &self.state);
        self.state = next;
        raw.parse().map_err(|raw| DecisionFault::InvalidAction { raw })
    }
}

// ── Isolation ────────────────────────────────────────────────────────

struct Request {
    params: GameParameters,
    regime: Regime,
    round: u32,
    seat: usize,
    history: Vec<RoundRecord>,
    rng: SeededRng,
}

struct Response {
    round: u32,
    result: Result<Action, DecisionFault>,
}

/// Runs a policy on a dedicated worker thread with a per-decision deadline.
///
/// A decision that misses the deadline is a timeout; the worker keeps
/// running and its late answer is discarded. While the worker is still
/// busy with an abandoned request, later rounds time out immediately.
/// A panicking or vanished worker yields invalid actions.
pub struct Isolated {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    pending: Option<u32>,
    timeout: Duration,
}

impl Isolated {
    pub fn spawn<P>(mut policy: P, timeout: Duration) -> std::io::Result<Self>
    where
        P: Policy + 'static,
    {
        let (requests, inbox) = mpsc::channel::<Request>();
        let (outbox, responses) = mpsc::channel::<Response>();

        thread::Builder::new()
            .name("policy-worker".to_string())
            .spawn(move || {
                for request in inbox {
                    let view = DecisionView {
                        params: &request.params,
                        regime: request.regime,
                        round: request.round,
                        seat: request.seat,
                        history: &request.history,
                        rng: request.rng,
                    };
                    let result = policy.decide(&view);
                    if outbox.send(Response { round: request.round, result }).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self { requests, responses, pending: None, timeout })
    }

    fn timed_out(&self) -> DecisionFault {
        DecisionFault::Timeout { millis: self.timeout.as_millis() as u64 }
    }

    fn worker_gone() -> DecisionFault {
        DecisionFault::InvalidAction { raw: "<policy worker exited>".to_string() }
    }
}

impl Policy for Isolated {
    fn decide(&mut self, view: &DecisionView<'_>) -> Result<Action, DecisionFault> {
        if let Some(round) = self.pending {
            match self.responses.try_recv() {
                Ok(_) => {
                    log::debug!("discarding late answer for round {}", round);
                    self.pending = None;
                }
                Err(TryRecvError::Empty) => return Err(self.timed_out()),
                Err(TryRecvError::Disconnected) => return Err(Self::worker_gone()),
            }
        }

        let request = Request {
            params: *view.params,
            regime: view.regime,
            round: view.round,
            seat: view.seat,
            history: view.history.to_vec(),
            rng: view.rng.clone(),
        };
        if self.requests.send(request).is_err() {
            return Err(Self::worker_gone());
        }
        self.pending = Some(view.round);

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.round == view.round => {
                    self.pending = None;
                    return response.result;
                }
                Ok(stale) => log::debug!("discarding stale answer for round {}", stale.round),
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
                Err(RecvTimeoutError::Disconnected) => {
                    self.pending = None;
                    return Err(Self::worker_gone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GameConfig;
    use crate::strategy::StrategyBase;
    use crate::vm::{op, BytecodeError};

    use Action::{Cooperate as C, Defect as D};

    fn config() -> GameConfig {
        GameConfig::linear(3, 5, "2".parse().unwrap()).unwrap()
    }

    fn view<'a>(config: &'a GameConfig, history: &'a [RoundRecord], round: u32) -> DecisionView<'a> {
        DecisionView {
            params: &config.params,
            regime: config.regime,
            round,
            seat: 0,
            history,
            rng: SeededRng::new(&[7u8; 32], 0).for_decision(round, 0),
        }
    }

    #[test]
    fn test_player_strategy_validation() {
        assert!(PlayerStrategy::Builtin(Strategy::new(StrategyBase::Punisher)).validate().is_ok());
        assert!(PlayerStrategy::Custom(vec![op::COOP]).validate().is_ok());
        assert_eq!(
            PlayerStrategy::Custom(vec![]).validate(),
            Err(ConfigError::InvalidBytecode(BytecodeError::Empty))
        );
    }

    #[test]
    fn test_player_strategy_json() {
        let json = r#"{"Builtin":{"base":"GrimTrigger"}}"#;
        let parsed: PlayerStrategy = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, PlayerStrategy::Builtin(Strategy::new(StrategyBase::GrimTrigger)));

        let custom: PlayerStrategy = serde_json::from_str(r#"{"Custom":[22]}"#).unwrap();
        assert_eq!(custom, PlayerStrategy::Custom(vec![op::DEFECT]));
    }

    #[test]
    fn test_runtime_reports_vm_fault_as_invalid_action() {
        let config = config();
        let mut runtime = Runtime::new(PlayerStrategy::Custom(vec![op::RETURN]));
        let result = runtime.decide(&view(&config, &[], 1));
        assert!(matches!(result, Err(DecisionFault::InvalidAction { .. })));
    }

    #[test]
    fn test_runtime_carries_machine_state() {
        let config = config();
        let mut runtime = Runtime::new(PlayerStrategy::Builtin(Strategy::new(StrategyBase::AlwaysDefect)));
        assert_eq!(runtime.decide(&view(&config, &[], 1)), Ok(D));
        assert_eq!(runtime.state().rounds_seen(), 0);
    }

    #[test]
    fn test_external_parses_text() {
        let config = config();
        let mut coop = External::new(|_: &GameParameters, _: &[RoundRecord]| " cooperate ".to_string());
        assert_eq!(coop.decide(&view(&config, &[], 1)), Ok(C));

        let mut junk = External::new(|_: &GameParameters, _: &[RoundRecord]| "maybe".to_string());
        assert_eq!(
            junk.decide(&view(&config, &[], 1)),
            Err(DecisionFault::InvalidAction { raw: "maybe".to_string() })
        );
    }

    #[test]
    fn test_stateful_threads_state() {
        let config = config();
        // alternate C, D, C, ...; a bad answer still advances state
        let mut policy = Stateful::new(0u32, |_: &GameParameters, _: &[RoundRecord], calls: &u32| {
            let text = match *calls {
                0 | 2 => "C",
                1 => "D",
                _ => "??",
            };
            (text.to_string(), calls + 1)
        });
        assert_eq!(policy.decide(&view(&config, &[], 1)), Ok(C));
        assert_eq!(policy.decide(&view(&config, &[], 2)), Ok(D));
        assert_eq!(policy.decide(&view(&config, &[], 3)), Ok(C));
        assert!(policy.decide(&view(&config, &[], 4)).is_err());
        assert_eq!(*policy.state(), 4);
    }

    #[test]
    fn test_isolated_answers_within_budget() {
        let config = config();
        let inner = Runtime::new(PlayerStrategy::Builtin(Strategy::new(StrategyBase::AlwaysCooperate)));
        let mut isolated = Isolated::spawn(inner, Duration::from_secs(5)).unwrap();
        for round in 1..=3 {
            assert_eq!(isolated.decide(&view(&config, &[], round)), Ok(C));
        }
    }

    #[test]
    fn test_isolated_times_out_slow_policy() {
        let config = config();
        let slow = External::new(|_: &GameParameters, _: &[RoundRecord]| {
            thread::sleep(Duration::from_millis(300));
            "C".to_string()
        });
        let mut isolated = Isolated::spawn(slow, Duration::from_millis(20)).unwrap();

        assert_eq!(
            isolated.decide(&view(&config, &[], 1)),
            Err(DecisionFault::Timeout { millis: 20 })
        );
        // still busy with round 1
        assert_eq!(
            isolated.decide(&view(&config, &[], 2)),
            Err(DecisionFault::Timeout { millis: 20 })
        );
    }

    #[test]
    fn test_isolated_survives_panicking_policy() {
        let config = config();
        let broken = External::new(|_: &GameParameters, _: &[RoundRecord]| -> String {
            panic!("policy crashed")
        });
        let mut isolated = Isolated::spawn(broken, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            isolated.decide(&view(&config, &[], 1)),
            Err(DecisionFault::InvalidAction { .. })
        ));
        assert!(matches!(
            isolated.decide(&view(&config, &[], 2)),
            Err(DecisionFault::InvalidAction { .. })
        ));
    }
}
