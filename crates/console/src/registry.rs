//! Reset signal registry.
//!
//! Components register one handler per `(topic, kind)` pair and any holder of
//! the registry can fire a topic. The registry is an ordinary value created at
//! startup and shared by `Arc`, not a global.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Topic fired when the whole UI returns to its initial state.
pub const RESET: &str = "reset";

/// Component that owns a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Console,
    Registers,
    Memory,
    Editor,
    Controls,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

pub type Handler = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// What happened when a topic fired.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Every handler that ran, in registration order.
    pub invoked: Vec<ComponentKind>,
    pub failures: Vec<(ComponentKind, HandlerError)>,
}

impl FireReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
pub struct ResetRegistry {
    topics: Mutex<IndexMap<String, IndexMap<ComponentKind, Handler>>>,
}

impl ResetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, IndexMap<ComponentKind, Handler>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `(topic, kind)`.
    ///
    /// A later registration for the same pair replaces the earlier handler and
    /// keeps its place in the firing order. Returns whether one was replaced.
    pub fn register<F>(&self, topic: &str, kind: ComponentKind, handler: F) -> bool
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let replaced = self
            .lock()
            .entry(topic.to_string())
            .or_default()
            .insert(kind, Arc::new(handler))
            .is_some();
        debug!(topic, ?kind, replaced, "handler registered");
        replaced
    }

    pub fn unregister(&self, topic: &str, kind: ComponentKind) -> bool {
        self.lock()
            .get_mut(topic)
            .and_then(|handlers| handlers.shift_remove(&kind))
            .is_some()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, IndexMap::len)
    }

    /// Run every handler of `topic` in registration order.
    ///
    /// Handlers run outside the registry lock, so a handler may register or
    /// fire itself. A failing or panicking handler is recorded and the rest
    /// still run.
    pub fn fire(&self, topic: &str) -> FireReport {
        let handlers: Vec<(ComponentKind, Handler)> = self
            .lock()
            .get(topic)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(kind, handler)| (*kind, Arc::clone(handler)))
                    .collect()
            })
            .unwrap_or_default();

        let mut report = FireReport::default();
        for (kind, handler) in handlers {
            report.invoked.push(kind);
            let outcome = catch_unwind(AssertUnwindSafe(|| handler()))
                .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));
            if let Err(error) = outcome {
                warn!(topic, ?kind, %error, "handler failed");
                report.failures.push((kind, error));
            }
        }
        debug!(topic, invoked = report.invoked.len(), "topic fired");
        report
    }
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
