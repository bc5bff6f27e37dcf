//! Simterm Engine
//!
//! The contract an execution engine fulfils for the control plane, plus a
//! reference register/memory machine that implements it.

pub mod engine;
pub mod error;
pub mod lexer;
pub mod machine;
pub mod memory;
pub mod parser;
pub mod registers;
pub mod types;

pub use engine::{ExecutionEngine, PrintSink};
pub use error::{EngineError, Result};
pub use machine::{Machine, MachineConfig, FAULT_EXIT_STATUS};
pub use types::*;
