//! Stack-based bytecode VM for custom player strategies.
//!
//! Programs are at most 64 bytes and run on a fixed 8-slot u8 stack.
//! Any runtime fault (stack underflow, unknown opcode, fuel exhaustion,
//! falling off the end) is reported to the runtime, which records an
//! invalid action and substitutes Defect for the round.

use thiserror::Error;

use crate::policy::DecisionView;
use crate::random::SeededRng;
use crate::strategy::Action;

// ── Constants ────────────────────────────────────────────────────────

/// Maximum bytecode program length in bytes.
pub const MAX_BYTECODE_LEN: usize = 64;

/// Maximum instructions the VM will execute before halting (fuel limit).
const MAX_FUEL: u32 = 128;

/// Stack depth (fixed array, no heap).
const STACK_SIZE: usize = 8;

// ── Opcodes ──────────────────────────────────────────────────────────

pub mod op {
    /// Terminal: cooperate
    pub const COOP: u8 = 0x00;
    /// Push the next byte
    pub const PUSH: u8 = 0x01;
    /// Cooperators in the most recent round (0 before round 2)
    pub const LAST_COOPS: u8 = 0x02;
    /// Pop n, push cooperators n rounds before the most recent one
    pub const COOPS_N: u8 = 0x03;
    /// Own last action (1 = defect, 0 = cooperate or none)
    pub const MY_LAST: u8 = 0x04;
    /// Pop n, push own action n rounds before the most recent one
    pub const MY_N: u8 = 0x05;
    /// Pop seat, push that seat's last action
    pub const SEAT_LAST: u8 = 0x06;
    /// Own defections so far
    pub const MY_DEFECTS: u8 = 0x07;
    /// Current round, 1-based
    pub const ROUND: u8 = 0x08;
    /// Uniform 0-99
    pub const RAND: u8 = 0x09;
    pub const ADD: u8 = 0x0A;
    pub const SUB: u8 = 0x0B;
    pub const MUL: u8 = 0x0C;
    pub const GT: u8 = 0x0D;
    pub const LT: u8 = 0x0E;
    pub const EQ: u8 = 0x0F;
    pub const NOT: u8 = 0x10;
    pub const AND: u8 = 0x11;
    pub const OR: u8 = 0x12;
    pub const DUP: u8 = 0x13;
    pub const JMP_FWD: u8 = 0x14;
    pub const JMP_FWD_IF: u8 = 0x15;
    /// Terminal: defect
    pub const DEFECT: u8 = 0x16;
    /// Number of players n
    pub const PLAYERS: u8 = 0x17;
    /// Threshold m (0 when the game has none)
    pub const THRESHOLD: u8 = 0x18;
    /// Rounds remaining after the current one
    pub const ROUNDS_LEFT: u8 = 0x19;
    /// Own seat index
    pub const SEAT: u8 = 0x1A;
    /// Past rounds whose cooperator count fell below m (or ⌈n/2⌉)
    pub const MISSES: u8 = 0x1B;
    /// Own payoff last round, rounded down (0 before round 2)
    pub const PAYOFF_LAST: u8 = 0x1C;
    /// Terminal: pop, 0 = cooperate, anything else = defect
    pub const RETURN: u8 = 0x1D;
}

// ── Validation ───────────────────────────────────────────────────────

/// Errors that can occur during bytecode validation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("bytecode is empty")]
    Empty,
    #[error("bytecode exceeds {} bytes", MAX_BYTECODE_LEN)]
    TooLong,
    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("truncated immediate at offset {offset}")]
    TruncatedImmediate { offset: usize },
    #[error("forward jump out of bounds at offset {offset}")]
    JumpOutOfBounds { offset: usize },
    #[error("no terminal instruction (COOP/DEFECT/RETURN)")]
    NoTerminal,
}

/// Runtime faults. Each one becomes an invalid-action fault for the round.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VmFault {
    #[error("stack underflow at offset {0}")]
    StackUnderflow(usize),
    #[error("stack overflow at offset {0}")]
    StackOverflow(usize),
    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("truncated immediate at offset {0}")]
    TruncatedImmediate(usize),
    #[error("fuel exhausted after {} instructions", MAX_FUEL)]
    FuelExhausted,
    #[error("program ended without a terminal instruction")]
    FellOffEnd,
}

/// Validate bytecode before a tournament is built.
///
/// Checks:
/// - Non-empty, at most `MAX_BYTECODE_LEN` bytes
/// - All opcodes are known
/// - All immediates are present (not truncated)
/// - All forward jumps land within bounds
/// - At least one terminal instruction exists
pub fn validate_bytecode(bytecode: &[u8]) -> Result<(), BytecodeError> {
    if bytecode.is_empty() {
        return Err(BytecodeError::Empty);
    }
    if bytecode.len() > MAX_BYTECODE_LEN {
        return Err(BytecodeError::TooLong);
    }

    let mut pc = 0usize;
    let mut has_terminal = false;

    while pc < bytecode.len() {
        let opcode = bytecode[pc];
        match opcode {
            op::COOP | op::DEFECT | op::RETURN => {
                has_terminal = true;
                pc += 1;
            }
            op::PUSH => {
                if pc + 1 >= bytecode.len() {
                    return Err(BytecodeError::TruncatedImmediate { offset: pc });
                }
                pc += 2;
            }
            op::JMP_FWD | op::JMP_FWD_IF => {
                if pc + 1 >= bytecode.len() {
                    return Err(BytecodeError::TruncatedImmediate { offset: pc });
                }
                let target = pc + 2 + bytecode[pc + 1] as usize;
                if target > bytecode.len() {
                    return Err(BytecodeError::JumpOutOfBounds { offset: pc });
                }
                pc += 2;
            }
            op::LAST_COOPS | op::COOPS_N | op::MY_LAST | op::MY_N | op::SEAT_LAST
            | op::MY_DEFECTS | op::ROUND | op::RAND | op::ADD | op::SUB | op::MUL
            | op::GT | op::LT | op::EQ | op::NOT | op::AND | op::OR | op::DUP
            | op::PLAYERS | op::THRESHOLD | op::ROUNDS_LEFT | op::SEAT | op::MISSES
            | op::PAYOFF_LAST => {
                pc += 1;
            }
            _ => {
                return Err(BytecodeError::UnknownOpcode { offset: pc, opcode });
            }
        }
    }

    if !has_terminal {
        return Err(BytecodeError::NoTerminal);
    }

    Ok(())
}

// ── Execution ────────────────────────────────────────────────────────

/// Execute a bytecode program and return the chosen action.
pub fn execute_bytecode(
    bytecode: &[u8],
    view: &DecisionView<'_>,
    rng: &mut SeededRng,
) -> Result<Action, VmFault> {
    let mut stack = Stack::default();
    let mut pc: usize = 0;
    let mut fuel: u32 = 0;

    while pc < bytecode.len() {
        fuel += 1;
        if fuel > MAX_FUEL {
            return Err(VmFault::FuelExhausted);
        }

        let opcode = bytecode[pc];
        match opcode {
            op::COOP => return Ok(Action::Cooperate),
            op::DEFECT => return Ok(Action::Defect),

            op::RETURN => {
                let v = stack.pop(pc)?;
                return Ok(if v == 0 { Action::Cooperate } else { Action::Defect });
            }

            op::PUSH => {
                let imm = *bytecode.get(pc + 1).ok_or(VmFault::TruncatedImmediate(pc))?;
                stack.push(pc, imm)?;
                pc += 2;
                continue;
            }

            op::JMP_FWD => {
                let offset = *bytecode.get(pc + 1).ok_or(VmFault::TruncatedImmediate(pc))? as usize;
                pc = pc + 2 + offset;
                continue;
            }

            op::JMP_FWD_IF => {
                let cond = stack.pop(pc)?;
                let offset = *bytecode.get(pc + 1).ok_or(VmFault::TruncatedImmediate(pc))? as usize;
                pc = if cond != 0 { pc + 2 + offset } else { pc + 2 };
                continue;
            }

            op::LAST_COOPS => {
                let v = cooperators_ago(view, 0);
                stack.push(pc, v)?;
            }

            op::COOPS_N => {
                let n = stack.pop(pc)? as usize;
                stack.push(pc, cooperators_ago(view, n))?;
            }

            op::MY_LAST => {
                stack.push(pc, seat_action_ago(view, view.seat, 0))?;
            }

            op::MY_N => {
                let n = stack.pop(pc)? as usize;
                stack.push(pc, seat_action_ago(view, view.seat, n))?;
            }

            op::SEAT_LAST => {
                let seat = stack.pop(pc)? as usize;
                stack.push(pc, seat_action_ago(view, seat, 0))?;
            }

            op::MY_DEFECTS => {
                let count = view.own_actions().filter(|a| *a == Action::Defect).count();
                stack.push(pc, saturate(count as u64))?;
            }

            op::ROUND => stack.push(pc, saturate(view.round as u64))?,
            op::RAND => stack.push(pc, rng.next_percent())?,
            op::PLAYERS => stack.push(pc, saturate(view.params.players as u64))?,
            op::THRESHOLD => stack.push(pc, saturate(view.params.threshold.unwrap_or(0) as u64))?,
            op::ROUNDS_LEFT => stack.push(pc, saturate(view.rounds_left() as u64))?,
            op::SEAT => stack.push(pc, saturate(view.seat as u64))?,

            op::MISSES => {
                let bar = view
                    .params
                    .threshold
                    .unwrap_or_else(|| view.params.players.div_ceil(2));
                let misses = view.history.iter().filter(|r| r.cooperators() < bar).count();
                stack.push(pc, saturate(misses as u64))?;
            }

            op::PAYOFF_LAST => {
                let v = view
                    .last()
                    .and_then(|r| r.payoffs().get(view.seat))
                    .map(|p| p.numer() / p.denom())
                    .unwrap_or(0);
                stack.push(pc, saturate(v))?;
            }

            op::ADD => stack.binary(pc, |a, b| a.saturating_add(b))?,
            op::SUB => stack.binary(pc, |a, b| a.saturating_sub(b))?,
            op::MUL => stack.binary(pc, |a, b| a.saturating_mul(b))?,
            op::GT => stack.binary(pc, |a, b| u8::from(a > b))?,
            op::LT => stack.binary(pc, |a, b| u8::from(a < b))?,
            op::EQ => stack.binary(pc, |a, b| u8::from(a == b))?,
            op::AND => stack.binary(pc, |a, b| u8::from(a != 0 && b != 0))?,
            op::OR => stack.binary(pc, |a, b| u8::from(a != 0 || b != 0))?,

            op::NOT => {
                let a = stack.pop(pc)?;
                stack.push(pc, u8::from(a == 0))?;
            }

            op::DUP => {
                let a = stack.pop(pc)?;
                stack.push(pc, a)?;
                stack.push(pc, a)?;
            }

            _ => return Err(VmFault::UnknownOpcode { offset: pc, opcode }),
        }
        pc += 1;
    }

    Err(VmFault::FellOffEnd)
}

// ── Stack ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Stack {
    slots: [u8; STACK_SIZE],
    sp: usize,
}

impl Stack {
    #[inline]
    fn push(&mut self, pc: usize, val: u8) -> Result<(), VmFault> {
        if self.sp >= STACK_SIZE {
            return Err(VmFault::StackOverflow(pc));
        }
        self.slots[self.sp] = val;
        self.sp += 1;
        Ok(())
    }

    #[inline]
    fn pop(&mut self, pc: usize) -> Result<u8, VmFault> {
        if self.sp == 0 {
            return Err(VmFault::StackUnderflow(pc));
        }
        self.sp -= 1;
        Ok(self.slots[self.sp])
    }

    #[inline]
    fn binary(&mut self, pc: usize, f: impl Fn(u8, u8) -> u8) -> Result<(), VmFault> {
        let b = self.pop(pc)?;
        let a = self.pop(pc)?;
        self.push(pc, f(a, b))
    }
}

// ── History helpers ──────────────────────────────────────────────────

#[inline]
fn saturate(v: u64) -> u8 {
    v.min(u8::MAX as u64) as u8
}

#[inline]
fn cooperators_ago(view: &DecisionView<'_>, n: usize) -> u8 {
    if n >= view.history.len() {
        return 0;
    }
    let idx = view.history.len() - 1 - n;
    saturate(view.history[idx].cooperators() as u64)
}

#[inline]
fn seat_action_ago(view: &DecisionView<'_>, seat: usize, n: usize) -> u8 {
    if n >= view.history.len() {
        return 0; // no data → Cooperate
    }
    let idx = view.history.len() - 1 - n;
    match view.history[idx].action(seat) {
        Some(Action::Defect) => 1,
        _ => 0,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
