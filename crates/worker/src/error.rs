//! Control-plane errors

use serde::{Deserialize, Serialize};
use simterm_engine::EngineError;
use thiserror::Error;

/// Control-plane result type
pub type Result<T> = std::result::Result<T, ControlError>;

/// Every way a command can fail.
///
/// Serializable so a failure raised in the execution context arrives at the
/// controller as the same variant.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum ControlError {
    #[error("call to `{0}` without providing its argument")]
    MissingArgument(String),

    #[error("invalid argument for `{command}`: {reason}")]
    InvalidArgument { command: String, reason: String },

    #[error("invalid command: `{0}`")]
    UnknownCommand(String),

    #[error("no program loaded")]
    NotLoaded,

    #[error("program has not completed")]
    NotCompleted,

    #[error("unrecognized register `{0}`")]
    UnknownRegister(String),

    #[error("address range {address:#x}+{length} is outside of memory")]
    OutOfBounds { address: u64, length: u64 },

    #[error("{0}")]
    LoadError(String),

    #[error("{0}")]
    ExecutionFault(String),

    #[error("engine initialization failed: {0}")]
    EngineInit(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("execution context channel unavailable")]
    ChannelUnavailable,
}

impl From<EngineError> for ControlError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Load { .. } => ControlError::LoadError(error.to_string()),
            EngineError::Fault(_) => ControlError::ExecutionFault(error.to_string()),
            EngineError::Init(message) => ControlError::EngineInit(message),
            EngineError::UnknownRegister(name) => ControlError::UnknownRegister(name),
            EngineError::OutOfBounds { address, length } => {
                ControlError::OutOfBounds { address, length }
            }
            EngineError::NotLoaded => ControlError::NotLoaded,
        }
    }
}
