//! The execution engine contract.
//!
//! The control plane never looks inside an engine. Everything it needs goes
//! through this trait, one synchronous call at a time, from the single thread
//! that owns the engine.

use crate::error::Result;
use crate::types::{MemoryBounds, RegisterValues, StepOutcome};

/// Receiver for console output fragments.
///
/// Engines call the sink synchronously while stepping, so every fragment a
/// `step` produces has been handed over before `step` returns.
pub type PrintSink = Box<dyn FnMut(&str) + Send>;

/// A register/memory virtual machine driven one instruction at a time.
///
/// Implementations are not expected to be reentrant.
pub trait ExecutionEngine {
    /// Prepare the engine for use. Called on every `ping`.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Replace the current program with `source`.
    fn load(&mut self, source: &str) -> Result<()>;

    /// Execute one instruction.
    fn step(&mut self) -> Result<StepOutcome>;

    /// Ask the engine to halt at the next opportunity.
    fn stop(&mut self);

    /// Drop the program and return to the unloaded state.
    fn reset(&mut self);

    fn is_loaded(&self) -> bool;

    fn is_completed(&self) -> bool;

    /// Exit status, present only once the program has completed normally.
    fn exit_status(&self) -> Option<i64>;

    fn register_value(&self, name: &str) -> Result<i64>;

    fn register_names(&self) -> Vec<String>;

    fn register_values(&self) -> RegisterValues;

    fn memory_bounds(&self) -> MemoryBounds;

    fn memory_slice(&self, address: u64, length: u64) -> Result<Vec<u8>>;

    /// Word size in bytes.
    fn word_size(&self) -> usize;

    /// Hand console input to the running program.
    fn receive_input(&mut self, text: &str);

    /// Install the print subscription. Engines hold at most one sink.
    fn subscribe_print(&mut self, sink: PrintSink);
}
