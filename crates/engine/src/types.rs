//! Value types exchanged with an execution engine.
//!
//! Everything here is serde-serializable: these are the payloads that cross
//! the channel between the execution context and the controller.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Register name to value, in register-file order.
pub type RegisterValues = IndexMap<String, i64>;

/// What a single `step` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// One instruction ran; `pc` is the program counter after it.
    Executed { pc: u64 },
    /// The program has finished.
    Completed { exit_status: Option<i64> },
    /// A pending stop request was consumed instead of executing.
    Stopped,
    /// The current instruction needs console input that has not arrived yet.
    AwaitingInput,
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }
}

/// Half-open addressable byte range `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBounds {
    pub lower: u64,
    pub upper: u64,
}

impl MemoryBounds {
    pub fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    pub fn len(&self) -> u64 {
        self.upper.saturating_sub(self.lower)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `[address, address + length)` lies entirely inside the bounds.
    pub fn contains_range(&self, address: u64, length: u64) -> bool {
        match address.checked_add(length) {
            Some(end) => address >= self.lower && end <= self.upper,
            None => false,
        }
    }
}

/// Width of a machine word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum WordSize {
    #[default]
    Four,
    Eight,
}

impl WordSize {
    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Highest address a register can hold as a positive value.
    pub fn max_address(self) -> u64 {
        match self {
            WordSize::Four => i32::MAX as u64,
            WordSize::Eight => i64::MAX as u64,
        }
    }

    /// Truncate `value` to the word width and sign-extend it back.
    pub fn wrap(self, value: i64) -> i64 {
        match self {
            WordSize::Four => value as i32 as i64,
            WordSize::Eight => value,
        }
    }
}

impl TryFrom<usize> for WordSize {
    type Error = String;

    fn try_from(bytes: usize) -> std::result::Result<Self, Self::Error> {
        match bytes {
            4 => Ok(WordSize::Four),
            8 => Ok(WordSize::Eight),
            other => Err(format!("invalid word size `{other}`")),
        }
    }
}

impl From<WordSize> for usize {
    fn from(size: WordSize) -> Self {
        size.bytes()
    }
}
