//! Command-line arguments.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use simterm_engine::memory::{DEFAULT_MEMORY_BASE, DEFAULT_MEMORY_BYTES};
use simterm_engine::{MachineConfig, WordSize};

#[derive(Parser, Debug)]
#[command(name = "simterm-run")]
#[command(about = "Run an assembly program on the simterm reference machine")]
pub struct Cli {
    /// Assembly source file to load.
    #[arg(value_name = "PROGRAM")]
    pub program: PathBuf,

    /// Drive the program from a prompt instead of running it to completion.
    #[arg(long, short)]
    pub interactive: bool,

    /// Give up after this many executed instructions.
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Machine word size in bytes (4 or 8).
    #[arg(long, default_value = "4", value_parser = parse_word_size)]
    pub word_size: WordSize,

    /// Size of memory in bytes.
    #[arg(long, default_value_t = DEFAULT_MEMORY_BYTES, value_parser = parse_usize)]
    pub memory_bytes: usize,

    /// Address of the first byte of memory.
    #[arg(long, default_value_t = DEFAULT_MEMORY_BASE, value_parser = parse_u64)]
    pub memory_base: u64,
}

impl Cli {
    /// Machine shape from the arguments, rejected as a usage error when the
    /// memory range cannot exist.
    pub fn machine_config(&self) -> Result<MachineConfig, clap::Error> {
        let config = MachineConfig {
            word_size: self.word_size,
            memory_base: self.memory_base,
            memory_bytes: self.memory_bytes,
        };
        config.validate().map_err(|err| {
            Cli::command().error(
                ErrorKind::ValueValidation,
                format!("invalid value for '--memory-base' / '--memory-bytes': {err}"),
            )
        })?;
        Ok(config)
    }
}

fn parse_word_size(text: &str) -> Result<WordSize, String> {
    let bytes = parse_usize(text)?;
    WordSize::try_from(bytes)
}

/// Decimal or `0x`-prefixed hexadecimal.
pub fn parse_u64(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid number `{text}`: {err}"))
}

fn parse_usize(text: &str) -> Result<usize, String> {
    let value = parse_u64(text)?;
    usize::try_from(value).map_err(|err| format!("invalid size `{text}`: {err}"))
}
