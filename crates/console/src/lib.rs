//! Simterm Console
//!
//! UI-side state: the terminal buffer, the reset signal registry and the
//! session that ties them to a [`simterm_worker::Controller`].

pub mod registry;
pub mod session;
pub mod terminal;

pub use registry::{ComponentKind, FireReport, HandlerError, ResetRegistry, RESET};
pub use session::{RunOutcome, Session};
pub use terminal::{Frame, Key, TerminalConsole};
