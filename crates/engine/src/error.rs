//! Engine errors

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("error parsing program at line {line}: {message}")]
    Load { line: usize, message: String },

    #[error("program error: {0}")]
    Fault(String),

    #[error("engine initialization failed: {0}")]
    Init(String),

    #[error("unrecognized register `{0}`")]
    UnknownRegister(String),

    #[error("address range {address:#x}+{length} is outside of memory")]
    OutOfBounds { address: u64, length: u64 },

    #[error("no program loaded")]
    NotLoaded,
}
