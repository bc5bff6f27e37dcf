//! Terminal console state.
//!
//! History is an append-only list of text fragments between resets. Rendering
//! concatenates the fragments and splits on newlines, so a fragment never has
//! to line up with a line boundary.

/// A key the console understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
}

/// Snapshot of what the terminal shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub lines: Vec<String>,
    pub input: String,
}

#[derive(Debug, Default)]
pub struct TerminalConsole {
    history: Vec<String>,
    pending: String,
    last_exit: Option<i64>,
    generation: u64,
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one keystroke. Returns the submitted line on `Enter`.
    pub fn keystroke(&mut self, key: Key) -> Option<String> {
        match key {
            Key::Char(c) => {
                self.pending.push(c);
                None
            }
            Key::Backspace => {
                self.pending.pop();
                None
            }
            Key::Enter => {
                let line = std::mem::take(&mut self.pending);
                self.history.push(format!("{line}\n"));
                Some(line)
            }
        }
    }

    /// Replace the whole input line, as a text field change would.
    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending = text.into();
    }

    pub fn pending_input(&self) -> &str {
        &self.pending
    }

    /// Append program output. The input line is left alone.
    pub fn print(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.history.push(fragment);
        }
    }

    /// Feed the current exit status. Appends the exit line when a status first
    /// appears; seeing the same status again appends nothing.
    ///
    /// Returns whether a line was appended.
    pub fn observe_exit_status(&mut self, status: Option<i64>) -> bool {
        if status == self.last_exit {
            return false;
        }
        self.last_exit = status;
        match status {
            Some(code) => {
                self.history
                    .push(format!("\nProgram exited with exit code {code}\n"));
                true
            }
            None => false,
        }
    }

    /// Render an error into the history on its own line.
    pub fn report_error(&mut self, message: &str) {
        let needs_break = self
            .history
            .last()
            .is_some_and(|fragment| !fragment.ends_with('\n'));
        let prefix = if needs_break { "\n" } else { "" };
        self.history.push(format!("{prefix}error: {message}\n"));
    }

    /// Clear history and input together.
    pub fn reset(&mut self) {
        self.history.clear();
        self.pending.clear();
        self.last_exit = None;
        self.generation += 1;
    }

    /// Incremented by every reset. Incremental renderers compare it to know
    /// when to start over.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Fragments appended after the first `count`.
    pub fn fragments_since(&self, count: usize) -> &[String] {
        self.history.get(count..).unwrap_or(&[])
    }

    pub fn frame(&self) -> Frame {
        let text: String = self.history.concat();
        Frame {
            lines: text.split('\n').map(str::to_string).collect(),
            input: self.pending.clone(),
        }
    }
}
