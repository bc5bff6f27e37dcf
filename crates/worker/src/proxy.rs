//! UI-side controller.
//!
//! Every call sends one command envelope and waits for one result. Results
//! carry no identifiers, so pairing is purely positional: the context answers
//! in arrival order and the controller resolves its oldest pending call. The
//! send and the enqueue of the reply slot happen under one lock, which keeps
//! the queue order identical to the channel order even with concurrent callers.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use simterm_engine::{ExecutionEngine, MemoryBounds, RegisterValues, StepOutcome};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::error::{ControlError, Result};
use crate::protocol::{Command, Envelope, EnvelopeKind, PrintEvent};

#[derive(Default)]
struct State {
    outbound: Option<UnboundedSender<Envelope>>,
    pending: VecDeque<oneshot::Sender<Envelope>>,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle for issuing commands to an execution context.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

/// Stream of console output from the execution context.
pub struct PrintEvents {
    receiver: UnboundedReceiver<PrintEvent>,
}

impl PrintEvents {
    pub async fn recv(&mut self) -> Option<PrintEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PrintEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything received so far, without waiting.
    pub fn drain(&mut self) -> Vec<PrintEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Controller {
    /// Wrap a channel pair. Spawns the inbound router on the current tokio runtime.
    pub fn connect(
        outbound: UnboundedSender<Envelope>,
        inbound: UnboundedReceiver<Envelope>,
    ) -> (Self, PrintEvents) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                outbound: Some(outbound),
                ..State::default()
            }),
        });
        let (print_tx, print_rx) = mpsc::unbounded_channel();
        tokio::spawn(route_inbound(inbound, Arc::downgrade(&shared), print_tx));
        (Self { shared }, PrintEvents { receiver: print_rx })
    }

    /// Start an execution context for the engine built by `factory` and connect to it.
    pub fn spawn<E, F>(factory: F) -> io::Result<(Self, PrintEvents, ExecutionContext)>
    where
        E: ExecutionEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (context, outbound, inbound) = ExecutionContext::spawn(factory)?;
        let (controller, prints) = Self::connect(outbound, inbound);
        Ok((controller, prints, context))
    }

    pub async fn invoke(&self, command: &Command) -> Result<Value> {
        self.invoke_raw(command.name(), command.argument()).await
    }

    /// Send a command by wire name and wait for its result.
    pub async fn invoke_raw(&self, name: &str, argument: Option<Value>) -> Result<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ControlError::ChannelUnavailable);
            }
            let outbound = state
                .outbound
                .as_ref()
                .ok_or(ControlError::ChannelUnavailable)?;
            outbound
                .send(Envelope::command(name, argument))
                .map_err(|_| ControlError::ChannelUnavailable)?;
            state.pending.push_back(reply_tx);
        }
        debug!(command = name, "command sent");

        let reply = reply_rx
            .await
            .map_err(|_| ControlError::ChannelUnavailable)?;
        reply.into_outcome()
    }

    /// Number of calls still waiting for a result.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_connected(&self) -> bool {
        let state = self.shared.lock();
        !state.closed && state.outbound.is_some()
    }

    /// Drop the command side of the channel. The context finishes the commands
    /// it already holds and then exits.
    pub fn disconnect(&self) {
        self.shared.lock().outbound = None;
    }

    pub async fn ping(&self) -> Result<String> {
        decode(self.invoke(&Command::Ping).await?)
    }

    pub async fn load(&self, source: impl Into<String>) -> Result<()> {
        let command = Command::Load {
            source: source.into(),
        };
        self.invoke(&command).await.map(drop)
    }

    pub async fn step(&self) -> Result<StepOutcome> {
        decode(self.invoke(&Command::Step).await?)
    }

    pub async fn stop(&self) -> Result<()> {
        self.invoke(&Command::Stop).await.map(drop)
    }

    pub async fn reset(&self) -> Result<()> {
        self.invoke(&Command::Reset).await.map(drop)
    }

    pub async fn is_completed(&self) -> Result<bool> {
        decode(self.invoke(&Command::IsCompleted).await?)
    }

    pub async fn exit_status(&self) -> Result<Option<i64>> {
        decode(self.invoke(&Command::GetExitStatus).await?)
    }

    pub async fn register_value(&self, name: impl Into<String>) -> Result<i64> {
        let command = Command::GetRegisterValue { name: name.into() };
        decode(self.invoke(&command).await?)
    }

    pub async fn register_names(&self) -> Result<Vec<String>> {
        decode(self.invoke(&Command::GetRegisterNames).await?)
    }

    pub async fn register_values(&self) -> Result<RegisterValues> {
        decode(self.invoke(&Command::GetRegisterValues).await?)
    }

    pub async fn memory_bounds(&self) -> Result<MemoryBounds> {
        decode(self.invoke(&Command::GetMemoryBounds).await?)
    }

    pub async fn memory_slice(&self, address: u64, length: u64) -> Result<Vec<u8>> {
        decode(
            self.invoke(&Command::GetMemorySlice { address, length })
                .await?,
        )
    }

    pub async fn word_size(&self) -> Result<usize> {
        decode(self.invoke(&Command::GetWordSize).await?)
    }

    pub async fn receive_input(&self, text: impl Into<String>) -> Result<()> {
        let command = Command::ReceiveInput { text: text.into() };
        self.invoke(&command).await.map(drop)
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|error| ControlError::Malformed(error.to_string()))
}

/// Routes everything the context sends back.
///
/// Prints are forwarded before any later result is resolved, so a caller that
/// wakes up on a result can already drain the output produced ahead of it.
/// The router only holds a weak reference: once every controller is gone the
/// command sender drops with them and the context winds down.
async fn route_inbound(
    mut inbound: UnboundedReceiver<Envelope>,
    shared: Weak<Shared>,
    prints: UnboundedSender<PrintEvent>,
) {
    while let Some(envelope) = inbound.recv().await {
        match envelope.kind {
            EnvelopeKind::Print => {
                let payload = match envelope.payload {
                    Some(Value::String(text)) => text,
                    Some(other) => other.to_string(),
                    None => continue,
                };
                // Nobody listening for output is not an error for the caller.
                let _ = prints.send(PrintEvent { payload });
            }
            EnvelopeKind::Result => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let waiting = shared.lock().pending.pop_front();
                match waiting {
                    Some(reply) => {
                        let _ = reply.send(envelope);
                    }
                    None => warn!(
                        command = envelope.command.as_deref().unwrap_or("?"),
                        "result with no pending call, dropping"
                    ),
                }
            }
            EnvelopeKind::Command => {
                warn!("execution context sent a command envelope, ignoring");
            }
        }
    }

    let Some(shared) = shared.upgrade() else {
        debug!("controller dropped, router exiting");
        return;
    };
    let rejected = {
        let mut state = shared.lock();
        state.closed = true;
        state.outbound = None;
        std::mem::take(&mut state.pending)
    };
    info!(pending = rejected.len(), "execution context channel closed");
    for reply in rejected {
        let _ = reply.send(Envelope::failure(None, ControlError::ChannelUnavailable));
    }
}
