//! Simterm Run
//!
//! Command-line front end: loads a program file into a machine behind the
//! control plane and drives it either to completion or from a prompt.

pub mod batch;
pub mod cli;
pub mod interactive;

use std::path::Path;

use anyhow::Context;
use simterm_console::TerminalConsole;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` to override. Logs go to stderr so program output on stdout
/// stays clean.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,simterm_run=info,simterm_console=info,simterm_worker=warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn read_program(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read program {}", path.display()))
}

/// Tracks how much of the console has been written out.
#[derive(Debug, Default)]
pub struct Renderer {
    generation: u64,
    written: usize,
}

impl Renderer {
    /// Text appended since the last call. A console reset starts over.
    pub fn take_new(&mut self, console: &TerminalConsole) -> String {
        if console.generation() != self.generation {
            self.generation = console.generation();
            self.written = 0;
        }
        let text = console.fragments_since(self.written).concat();
        self.written = console.history().len();
        text
    }

    /// Mark everything currently in the console as written.
    pub fn skip(&mut self, console: &TerminalConsole) {
        self.take_new(console);
    }
}
