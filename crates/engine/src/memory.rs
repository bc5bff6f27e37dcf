//! Byte-addressed machine memory.

use crate::error::{EngineError, Result};
use crate::types::{MemoryBounds, WordSize};

pub const DEFAULT_MEMORY_BASE: u64 = 0x1000;
pub const DEFAULT_MEMORY_BYTES: usize = 0x4000;

#[derive(Debug, Clone)]
pub struct Memory {
    base: u64,
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    pub fn bounds(&self) -> MemoryBounds {
        MemoryBounds::new(self.base, self.base + self.bytes.len() as u64)
    }

    fn range(&self, address: u64, length: u64) -> Result<std::ops::Range<usize>> {
        if !self.bounds().contains_range(address, length) {
            return Err(EngineError::OutOfBounds { address, length });
        }
        let start = (address - self.base) as usize;
        Ok(start..start + length as usize)
    }

    pub fn slice(&self, address: u64, length: u64) -> Result<&[u8]> {
        let range = self.range(address, length)?;
        Ok(&self.bytes[range])
    }

    /// Read a little-endian word, sign-extended.
    pub fn read_word(&self, address: u64, word_size: WordSize) -> Result<i64> {
        let bytes = self.slice(address, word_size.bytes() as u64)?;
        let mut buffer = [0u8; 8];
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(word_size.wrap(i64::from_le_bytes(buffer)))
    }

    pub fn write_word(&mut self, address: u64, value: i64, word_size: WordSize) -> Result<()> {
        let range = self.range(address, word_size.bytes() as u64)?;
        let encoded = value.to_le_bytes();
        self.bytes[range].copy_from_slice(&encoded[..word_size.bytes()]);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }
}
