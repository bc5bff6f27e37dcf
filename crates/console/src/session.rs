//! UI-side session: console, controller and registry wired together.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use simterm_engine::{RegisterValues, StepOutcome};
use simterm_worker::{ControlError, Controller, PrintEvents, Result};
use tracing::{debug, info};

use crate::registry::{ComponentKind, FireReport, ResetRegistry, RESET};
use crate::terminal::{Frame, Key, TerminalConsole};

/// How a [`Session::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { exit_status: Option<i64> },
    Stopped,
    AwaitingInput,
    StepLimit { steps: usize },
}

pub struct Session {
    controller: Controller,
    prints: PrintEvents,
    console: Arc<Mutex<TerminalConsole>>,
    registry: Arc<ResetRegistry>,
    executed: usize,
}

impl Session {
    /// Build a session and register its console under [`RESET`].
    pub fn new(controller: Controller, prints: PrintEvents, registry: Arc<ResetRegistry>) -> Self {
        let console = Arc::new(Mutex::new(TerminalConsole::new()));
        let handle = Arc::clone(&console);
        registry.register(RESET, ComponentKind::Console, move || {
            handle.lock().unwrap_or_else(PoisonError::into_inner).reset();
            Ok(())
        });
        Self {
            controller,
            prints,
            console,
            registry,
            executed: 0,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn registry(&self) -> &Arc<ResetRegistry> {
        &self.registry
    }

    pub fn console(&self) -> MutexGuard<'_, TerminalConsole> {
        self.console.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instructions executed since the last load or reset.
    pub fn steps_executed(&self) -> usize {
        self.executed
    }

    pub fn frame(&self) -> Frame {
        self.console().frame()
    }

    /// Move every print received so far into the console.
    pub fn pump_output(&mut self) -> usize {
        let events = self.prints.drain();
        if events.is_empty() {
            return 0;
        }
        let mut console = self.console();
        for event in &events {
            console.print(event.payload.as_str());
        }
        events.len()
    }

    /// Pump output and render a failure into the console.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        self.pump_output();
        if let Err(error) = &outcome {
            self.console().report_error(&error.to_string());
        }
        outcome
    }

    /// Check that the execution context answers.
    pub async fn start(&mut self) -> Result<()> {
        let outcome = self.controller.ping().await.map(drop);
        if outcome.is_ok() {
            info!("execution context ready");
        }
        self.settle(outcome)
    }

    pub async fn load(&mut self, source: &str) -> Result<()> {
        let outcome = self.controller.load(source).await;
        if outcome.is_ok() {
            self.executed = 0;
            self.console().observe_exit_status(None);
        }
        self.settle(outcome)
    }

    /// Step once. Output of the step is in the console when this returns.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        let outcome = self.controller.step().await;
        match &outcome {
            Ok(StepOutcome::Executed { .. }) => self.executed += 1,
            Ok(StepOutcome::Completed { exit_status }) => {
                self.pump_output();
                self.console().observe_exit_status(*exit_status);
            }
            _ => {}
        }
        self.settle(outcome)
    }

    /// Step until the program completes, stops, waits for input, or `max_steps`
    /// instructions have executed.
    pub async fn run(&mut self, max_steps: Option<usize>) -> Result<RunOutcome> {
        let mut steps = 0;
        loop {
            if max_steps.is_some_and(|limit| steps >= limit) {
                debug!(steps, "step limit reached");
                return Ok(RunOutcome::StepLimit { steps });
            }
            match self.step().await? {
                StepOutcome::Executed { .. } => steps += 1,
                StepOutcome::Completed { exit_status } => {
                    return Ok(RunOutcome::Completed { exit_status })
                }
                StepOutcome::Stopped => return Ok(RunOutcome::Stopped),
                StepOutcome::AwaitingInput => return Ok(RunOutcome::AwaitingInput),
            }
            // Let a concurrent `stop` reach the context between steps.
            tokio::task::yield_now().await;
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        let outcome = self.controller.stop().await;
        self.settle(outcome)
    }

    /// Reset the engine, then every registered component.
    pub async fn reset(&mut self) -> Result<FireReport> {
        let outcome = self.controller.reset().await;
        self.pump_output();
        match outcome {
            Ok(()) => {
                self.executed = 0;
                Ok(self.registry.fire(RESET))
            }
            Err(error) => self.settle(Err(error)),
        }
    }

    /// Apply a keystroke. A submitted line goes to the program as input.
    pub async fn keystroke(&mut self, key: Key) -> Result<()> {
        let submitted = self.console().keystroke(key);
        match submitted {
            Some(line) => {
                let outcome = self.controller.receive_input(line).await;
                self.settle(outcome)
            }
            None => Ok(()),
        }
    }

    /// Type `line` into the console and press Enter.
    pub async fn submit_line(&mut self, line: &str) -> Result<()> {
        self.console().set_pending_input(line);
        self.keystroke(Key::Enter).await
    }

    pub async fn registers(&mut self) -> Result<RegisterValues> {
        let outcome = self.controller.register_values().await;
        self.settle(outcome)
    }

    pub async fn register(&mut self, name: &str) -> Result<i64> {
        let outcome = self.controller.register_value(name).await;
        self.settle(outcome)
    }

    pub async fn memory(&mut self, address: u64, length: u64) -> Result<Vec<u8>> {
        let outcome = self.controller.memory_slice(address, length).await;
        self.settle(outcome)
    }

    pub async fn is_completed(&mut self) -> Result<bool> {
        let outcome = self.controller.is_completed().await;
        self.settle(outcome)
    }

    /// Exit status once completed, `None` while the program still runs.
    pub async fn exit_status(&mut self) -> Result<Option<i64>> {
        match self.controller.exit_status().await {
            Err(ControlError::NotCompleted) => Ok(None),
            outcome => {
                let outcome = self.settle(outcome);
                if let Ok(status) = &outcome {
                    self.console().observe_exit_status(*status);
                }
                outcome
            }
        }
    }
}
