//! Simterm Worker
//!
//! The two halves of the control plane. The execution context runs on its own
//! thread, owns the engine and answers one command at a time; the controller
//! lives on the UI side and turns method calls into request/response pairs over
//! a single ordered channel.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod relay;

pub use context::ExecutionContext;
pub use dispatcher::CommandDispatcher;
pub use error::{ControlError, Result};
pub use protocol::{Command, Envelope, EnvelopeKind, PrintEvent};
pub use proxy::{Controller, PrintEvents};
pub use relay::OutputRelay;
