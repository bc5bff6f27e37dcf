//! Command dispatch inside the execution context.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;
use simterm_engine::ExecutionEngine;
use tracing::{debug, warn};

use crate::error::{ControlError, Result};
use crate::protocol::{Command, Envelope, EnvelopeKind};

/// Marker returned by a successful `ping`.
pub const READY: &str = "pong";

/// Maps commands onto engine calls, one at a time.
pub struct CommandDispatcher<E> {
    engine: E,
}

impl<E: ExecutionEngine> CommandDispatcher<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Answer one envelope with exactly one result envelope.
    ///
    /// Never panics. Parse failures, engine failures and engine panics all come
    /// back as failure results.
    pub fn dispatch(&mut self, envelope: Envelope) -> Envelope {
        if envelope.kind != EnvelopeKind::Command {
            let reason = format!("{:?} envelope sent to the execution context", envelope.kind);
            warn!("{}", reason);
            return Envelope::failure(envelope.command, ControlError::Malformed(reason));
        }
        let Some(name) = envelope.command else {
            warn!("command envelope without a command name");
            return Envelope::failure(
                None,
                ControlError::Malformed("command envelope without a command name".to_string()),
            );
        };

        let outcome = Command::from_wire(&name, envelope.argument)
            .and_then(|command| self.execute(command));
        match outcome {
            Ok(payload) => {
                debug!(command = %name, "command ok");
                Envelope::success(name, payload)
            }
            Err(error) => {
                warn!(command = %name, %error, "command rejected");
                Envelope::failure(Some(name), error)
            }
        }
    }

    /// Run a parsed command against the engine.
    pub fn execute(&mut self, command: Command) -> Result<Value> {
        let engine = &mut self.engine;
        match catch_unwind(AssertUnwindSafe(|| run(engine, command))) {
            Ok(outcome) => outcome,
            Err(panic) => Err(ControlError::ExecutionFault(format!(
                "engine panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn run<E: ExecutionEngine>(engine: &mut E, command: Command) -> Result<Value> {
    match command {
        Command::Ping => {
            engine.init().map_err(|error| match error {
                simterm_engine::EngineError::Init(message) => ControlError::EngineInit(message),
                other => ControlError::EngineInit(other.to_string()),
            })?;
            Ok(Value::String(READY.to_string()))
        }
        Command::Load { source } => {
            engine.load(&source)?;
            Ok(Value::Null)
        }
        Command::Step => {
            if !engine.is_loaded() {
                return Err(ControlError::NotLoaded);
            }
            payload(engine.step()?)
        }
        Command::Stop => {
            engine.stop();
            Ok(Value::Null)
        }
        Command::Reset => {
            engine.reset();
            Ok(Value::Null)
        }
        Command::IsCompleted => Ok(Value::Bool(engine.is_completed())),
        Command::GetExitStatus => {
            if !engine.is_completed() {
                return Err(ControlError::NotCompleted);
            }
            payload(engine.exit_status())
        }
        Command::GetRegisterValue { name } => payload(engine.register_value(&name)?),
        Command::GetRegisterNames => payload(engine.register_names()),
        Command::GetRegisterValues => payload(engine.register_values()),
        Command::GetMemoryBounds => payload(engine.memory_bounds()),
        Command::GetMemorySlice { address, length } => {
            if !engine.memory_bounds().contains_range(address, length) {
                return Err(ControlError::OutOfBounds { address, length });
            }
            payload(engine.memory_slice(address, length)?)
        }
        Command::GetWordSize => payload(engine.word_size()),
        Command::ReceiveInput { text } => {
            engine.receive_input(&text);
            Ok(Value::Null)
        }
    }
}

fn payload<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|error| ControlError::Malformed(error.to_string()))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
