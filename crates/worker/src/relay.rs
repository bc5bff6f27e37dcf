//! Engine print output to `print` envelopes.

use simterm_engine::ExecutionEngine;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::protocol::Envelope;

/// Forwards engine output onto the outbound channel.
///
/// Prints share the channel with results, and the engine emits them while
/// `step` runs, so every fragment of a step is queued before that step's result.
pub struct OutputRelay {
    outbound: UnboundedSender<Envelope>,
}

impl OutputRelay {
    pub fn new(outbound: UnboundedSender<Envelope>) -> Self {
        Self { outbound }
    }

    /// Subscribe to `engine` for the rest of its lifetime.
    pub fn attach<E: ExecutionEngine + ?Sized>(self, engine: &mut E) {
        let outbound = self.outbound;
        engine.subscribe_print(Box::new(move |text: &str| {
            if text.is_empty() {
                return;
            }
            trace!(bytes = text.len(), "print");
            // A closed channel means the controller is gone; output has nowhere to go.
            let _ = outbound.send(Envelope::print(text));
        }));
    }
}
