//! The execution context thread.

use std::io;
use std::thread::{self, JoinHandle};

use simterm_engine::ExecutionEngine;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::protocol::Envelope;
use crate::relay::OutputRelay;

const THREAD_NAME: &str = "simterm-context";

/// Handle to a running execution context.
///
/// The engine lives on a dedicated OS thread and is only reachable through the
/// channel pair returned by [`ExecutionContext::spawn`].
pub struct ExecutionContext {
    handle: JoinHandle<()>,
}

impl ExecutionContext {
    /// Start a context whose engine is built by `factory` on the new thread.
    ///
    /// Returns the command sender and the result/print receiver. The context
    /// stops once every command sender is dropped.
    pub fn spawn<E, F>(
        factory: F,
    ) -> io::Result<(Self, UnboundedSender<Envelope>, UnboundedReceiver<Envelope>)>
    where
        E: ExecutionEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let mut engine = factory();
                OutputRelay::new(reply_tx.clone()).attach(&mut engine);
                run(CommandDispatcher::new(engine), command_rx, reply_tx);
            })?;

        Ok((Self { handle }, command_tx, reply_rx))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the context thread to exit.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// Sequential dispatch loop. Each command is answered before the next is read.
pub fn run<E: ExecutionEngine>(
    mut dispatcher: CommandDispatcher<E>,
    mut inbound: UnboundedReceiver<Envelope>,
    outbound: UnboundedSender<Envelope>,
) {
    info!("execution context started");
    while let Some(envelope) = inbound.blocking_recv() {
        let reply = dispatcher.dispatch(envelope);
        if outbound.send(reply).is_err() {
            warn!("controller dropped its receiver, shutting down");
            break;
        }
    }
    info!("execution context stopped");
}
