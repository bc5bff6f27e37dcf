//! Integration test harness for simterm.
//!
//! Runs a real execution context (the reference machine or a scripted engine
//! double) behind a real controller, with a tap on the inbound channel so tests
//! can slip print events between results.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use simterm_console::{ResetRegistry, Session};
use simterm_engine::{
    EngineError, ExecutionEngine, Machine, MemoryBounds, PrintSink, RegisterValues, StepOutcome,
};
use simterm_worker::{Controller, Envelope, ExecutionContext, PrintEvents};
use tokio::sync::mpsc::{self, WeakUnboundedSender};

/// Calls made on a [`ScriptedEngine`], in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// One scripted `step`: the output it prints, then what it returns.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    prints: Vec<String>,
    outcome: StepOutcome,
}

impl ScriptedStep {
    pub fn executed(pc: u64) -> Self {
        Self {
            prints: Vec::new(),
            outcome: StepOutcome::Executed { pc },
        }
    }

    pub fn completed(exit_status: i64) -> Self {
        Self {
            prints: Vec::new(),
            outcome: StepOutcome::Completed {
                exit_status: Some(exit_status),
            },
        }
    }

    pub fn print(mut self, text: &str) -> Self {
        self.prints.push(text.to_string());
        self
    }
}

pub const SCRIPTED_MEMORY_BASE: u64 = 0x100;
pub const SCRIPTED_MEMORY_BYTES: usize = 16;

/// Engine double that replays a fixed list of steps.
///
/// Any source loads. Once the script runs out the program completes with
/// status 0.
pub struct ScriptedEngine {
    script: Vec<ScriptedStep>,
    remaining: VecDeque<ScriptedStep>,
    loaded: bool,
    exit_status: Option<i64>,
    stop_requested: bool,
    memory: Vec<u8>,
    sink: Option<PrintSink>,
    calls: CallLog,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ScriptedStep>, calls: CallLog) -> Self {
        Self {
            script,
            remaining: VecDeque::new(),
            loaded: false,
            exit_status: None,
            stop_requested: false,
            memory: (0..SCRIPTED_MEMORY_BYTES as u8).collect(),
            sink: None,
            calls,
        }
    }

    fn record(&self, call: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.to_string());
        }
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn load(&mut self, source: &str) -> simterm_engine::Result<()> {
        self.record(&format!("load {source}"));
        self.remaining = self.script.iter().cloned().collect();
        self.loaded = true;
        self.exit_status = None;
        Ok(())
    }

    fn step(&mut self) -> simterm_engine::Result<StepOutcome> {
        self.record("step");
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        if let Some(status) = self.exit_status {
            return Ok(StepOutcome::Completed {
                exit_status: Some(status),
            });
        }
        if std::mem::take(&mut self.stop_requested) {
            return Ok(StepOutcome::Stopped);
        }
        let step = self
            .remaining
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::completed(0));
        if let Some(sink) = self.sink.as_mut() {
            for text in &step.prints {
                sink(text);
            }
        }
        if let StepOutcome::Completed { exit_status } = step.outcome {
            self.exit_status = exit_status;
        }
        Ok(step.outcome)
    }

    fn stop(&mut self) {
        self.record("stop");
        self.stop_requested = true;
    }

    fn reset(&mut self) {
        self.record("reset");
        self.remaining.clear();
        self.loaded = false;
        self.exit_status = None;
        self.stop_requested = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn is_completed(&self) -> bool {
        self.exit_status.is_some()
    }

    fn exit_status(&self) -> Option<i64> {
        self.exit_status
    }

    fn register_value(&self, name: &str) -> simterm_engine::Result<i64> {
        match name {
            "pc" => Ok((self.script.len() - self.remaining.len()) as i64),
            other => Err(EngineError::UnknownRegister(other.to_string())),
        }
    }

    fn register_names(&self) -> Vec<String> {
        vec!["pc".to_string()]
    }

    fn register_values(&self) -> RegisterValues {
        self.register_names()
            .into_iter()
            .filter_map(|name| self.register_value(&name).ok().map(|value| (name, value)))
            .collect()
    }

    fn memory_bounds(&self) -> MemoryBounds {
        MemoryBounds::new(
            SCRIPTED_MEMORY_BASE,
            SCRIPTED_MEMORY_BASE + SCRIPTED_MEMORY_BYTES as u64,
        )
    }

    fn memory_slice(&self, address: u64, length: u64) -> simterm_engine::Result<Vec<u8>> {
        if !self.memory_bounds().contains_range(address, length) {
            return Err(EngineError::OutOfBounds { address, length });
        }
        let start = (address - SCRIPTED_MEMORY_BASE) as usize;
        Ok(self.memory[start..start + length as usize].to_vec())
    }

    fn word_size(&self) -> usize {
        4
    }

    fn receive_input(&mut self, text: &str) {
        self.record(&format!("input {text}"));
    }

    fn subscribe_print(&mut self, sink: PrintSink) {
        self.record("subscribe");
        self.sink = Some(sink);
    }
}

/// A controller wired to a live execution context.
pub struct TestHarness {
    controller: Controller,
    prints: Option<PrintEvents>,
    context: Option<ExecutionContext>,
    tap: WeakUnboundedSender<Envelope>,
    calls: CallLog,
}

impl TestHarness {
    /// Harness around the reference machine.
    ///
    /// # Panics
    ///
    /// Panics if the context thread cannot be spawned or no tokio runtime is running.
    pub fn machine() -> Self {
        Self::with_engine(Machine::default, CallLog::default())
    }

    /// Harness around a [`ScriptedEngine`] replaying `script`.
    pub fn scripted(script: Vec<ScriptedStep>) -> Self {
        let calls = CallLog::default();
        let log = Arc::clone(&calls);
        Self::with_engine(move || ScriptedEngine::new(script, log), calls)
    }

    fn with_engine<E, F>(factory: F, calls: CallLog) -> Self
    where
        E: ExecutionEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (context, outbound, mut replies) =
            ExecutionContext::spawn(factory).expect("failed to spawn execution context");

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let tap = inbound_tx.downgrade();
        tokio::spawn(async move {
            while let Some(envelope) = replies.recv().await {
                if inbound_tx.send(envelope).is_err() {
                    break;
                }
            }
        });

        let (controller, prints) = Controller::connect(outbound, inbound_rx);
        Self {
            controller,
            prints: Some(prints),
            context: Some(context),
            tap,
            calls,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Print stream. Gone once [`TestHarness::session`] has taken it.
    pub fn prints(&mut self) -> &mut PrintEvents {
        self.prints.as_mut().expect("print stream was moved into a session")
    }

    /// Deliver a print event to the controller as if the context had sent it.
    pub fn inject_print(&self, text: &str) {
        let tap = self.tap.upgrade().expect("execution context already closed");
        tap.send(Envelope::print(text)).expect("controller inbound closed");
    }

    /// Calls seen by a scripted engine so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Build a UI session over this harness's controller.
    pub fn session(&mut self, registry: Arc<ResetRegistry>) -> Session {
        let prints = self.prints.take().expect("session already created");
        Session::new(self.controller.clone(), prints, registry)
    }

    /// Disconnect and wait for the context thread to finish.
    pub fn shutdown(mut self) {
        self.controller.disconnect();
        if let Some(context) = self.context.take() {
            context.join().expect("execution context panicked");
        }
    }
}
