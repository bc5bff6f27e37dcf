//! Register file.

use crate::types::{RegisterValues, WordSize};

pub const REGISTER_COUNT: usize = 54;

/// Register names in register-file order.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = [
    "ZERO", "PID", "FID", "PC", "SP", "RA", "A0", "A1", "A2", "R0", "R1", "R2", // base
    "S0", "S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", // saved
    "T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9", // temporary
    "FS0", "FS1", "FS2", "FS3", "FS4", "FS5", "FS6", "FS7", "FS8", "FS9", // saved float
    "FT0", "FT1", "FT2", "FT3", "FT4", "FT5", "FT6", "FT7", "FT8", "FT9", // temporary float
    "LO", "HI", // multiplication halves
];

pub const ZERO: usize = 0;
pub const PC: usize = 3;
pub const SP: usize = 4;
pub const R0: usize = 9;
pub const LO: usize = 52;
pub const HI: usize = 53;

/// Resolve a register name to its index.
///
/// Names are case-insensitive and may carry a leading `$`.
pub fn index_of(name: &str) -> Option<usize> {
    let name = name.strip_prefix('$').unwrap_or(name);
    REGISTER_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone)]
pub struct RegisterFile {
    values: [i64; REGISTER_COUNT],
    word_size: WordSize,
}

impl RegisterFile {
    pub fn new(word_size: WordSize) -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            word_size,
        }
    }

    pub fn get(&self, index: usize) -> i64 {
        self.values.get(index).copied().unwrap_or(0)
    }

    /// Write a register, wrapping to the word width. Writes to `ZERO` are dropped.
    pub fn set(&mut self, index: usize, value: i64) {
        if index == ZERO {
            return;
        }
        if let Some(slot) = self.values.get_mut(index) {
            *slot = self.word_size.wrap(value);
        }
    }

    pub fn by_name(&self, name: &str) -> Option<i64> {
        index_of(name).map(|index| self.get(index))
    }

    pub fn values(&self) -> RegisterValues {
        REGISTER_NAMES
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    pub fn reset(&mut self) {
        self.values = [0; REGISTER_COUNT];
    }
}
