//! Prompt-driven mode.
//!
//! Lines starting with `:` control the machine; anything else is typed into
//! the console and submitted as program input.

use std::fmt::Write as _;
use std::path::Path;

use simterm_console::{RunOutcome, Session};
use simterm_engine::StepOutcome;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::cli::parse_u64;
use crate::Renderer;

const HELP: &str = "\
commands:
  :help             show this help
  :step [n]         execute n instructions (default 1)
  :run              run until completion, stop or input wait
  :stop             request a stop before the next instruction
  :reset            unload the program and clear the console
  :reload           read the program file again and load it
  :regs             show every register
  :reg NAME         show one register
  :mem ADDR LEN     dump LEN bytes of memory from ADDR
  :status           show completion state
  :quit             leave
anything else is sent to the program as an input line
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    Help,
    Step(usize),
    Run,
    Stop,
    Reset,
    Reload,
    Regs,
    Reg(String),
    Mem { address: u64, length: u64 },
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Control(ControlLine),
    Text(String),
}

/// Parse one line typed at the prompt.
pub fn parse_line(line: &str) -> Result<Input, String> {
    let Some(control) = line.trim().strip_prefix(':') else {
        return Ok(Input::Text(line.to_string()));
    };
    let mut parts = control.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let parsed = match (command, args.as_slice()) {
        ("help" | "h", []) => ControlLine::Help,
        ("step" | "s", []) => ControlLine::Step(1),
        ("step" | "s", [count]) => ControlLine::Step(
            count
                .parse()
                .map_err(|_| format!("invalid step count `{count}`"))?,
        ),
        ("run" | "r", []) => ControlLine::Run,
        ("stop", []) => ControlLine::Stop,
        ("reset", []) => ControlLine::Reset,
        ("reload", []) => ControlLine::Reload,
        ("regs", []) => ControlLine::Regs,
        ("reg", [name]) => ControlLine::Reg(name.to_string()),
        ("mem", [address, length]) => ControlLine::Mem {
            address: parse_u64(address)?,
            length: parse_u64(length)?,
        },
        ("status", []) => ControlLine::Status,
        ("quit" | "q", []) => ControlLine::Quit,
        ("", _) => return Err("empty command, try :help".to_string()),
        (other, _) => return Err(format!("unknown command `:{other}`, try :help")),
    };
    Ok(Input::Control(parsed))
}

/// Read prompt lines from `input` until `:quit` or end of input.
pub async fn run<R, W>(
    session: &mut Session,
    program: &Path,
    input: R,
    output: &mut W,
    max_steps: Option<usize>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut renderer = Renderer::default();
    let mut lines = input.lines();

    output
        .write_all(b"simterm ready, :help lists commands\n")
        .await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse_line(&line) {
            Ok(Input::Control(ControlLine::Quit)) => break,
            Ok(Input::Control(control)) => {
                debug!(?control, "control line");
                execute(session, program, control, max_steps).await
            }
            Ok(Input::Text(text)) => {
                // Failures are already rendered into the console.
                let _ = session.submit_line(&text).await;
                renderer.skip(&session.console());
                String::new()
            }
            Err(message) => format!("{message}\n"),
        };

        let console_text = renderer.take_new(&session.console());
        output.write_all(console_text.as_bytes()).await?;
        output.write_all(reply.as_bytes()).await?;
        output.flush().await?;
    }

    info!("leaving interactive mode");
    Ok(())
}

/// Run one control line and return the text to show for it. Session failures
/// land in the console, so they produce no reply here.
async fn execute(
    session: &mut Session,
    program: &Path,
    control: ControlLine,
    max_steps: Option<usize>,
) -> String {
    let mut reply = String::new();
    match control {
        ControlLine::Help => reply.push_str(HELP),
        ControlLine::Step(count) => {
            for _ in 0..count {
                match session.step().await {
                    Ok(StepOutcome::Executed { pc }) if count == 1 => {
                        let _ = writeln!(reply, "pc = {pc}");
                    }
                    Ok(StepOutcome::Executed { .. }) => {}
                    Ok(StepOutcome::AwaitingInput) => {
                        reply.push_str("waiting for input\n");
                        break;
                    }
                    Ok(StepOutcome::Stopped) => {
                        reply.push_str("stopped\n");
                        break;
                    }
                    Ok(StepOutcome::Completed { .. }) | Err(_) => break,
                }
            }
        }
        ControlLine::Run => match session.run(max_steps).await {
            Ok(RunOutcome::AwaitingInput) => reply.push_str("waiting for input\n"),
            Ok(RunOutcome::Stopped) => reply.push_str("stopped\n"),
            Ok(RunOutcome::StepLimit { steps }) => {
                let _ = writeln!(reply, "paused after {steps} instructions");
            }
            Ok(RunOutcome::Completed { .. }) | Err(_) => {}
        },
        ControlLine::Stop => {
            if session.stop().await.is_ok() {
                reply.push_str("stop requested\n");
            }
        }
        ControlLine::Reset => {
            if let Ok(report) = session.reset().await {
                for (kind, error) in &report.failures {
                    let _ = writeln!(reply, "reset of {kind:?} failed: {error}");
                }
            }
        }
        ControlLine::Reload => match crate::read_program(program).await {
            Ok(source) => {
                if session.load(&source).await.is_ok() {
                    let _ = writeln!(reply, "reloaded {}", program.display());
                }
            }
            Err(error) => {
                let _ = writeln!(reply, "{error:#}");
            }
        },
        ControlLine::Regs => {
            if let Ok(values) = session.registers().await {
                for (name, value) in &values {
                    let _ = writeln!(reply, "{name:>4} = {value}");
                }
            }
        }
        ControlLine::Reg(name) => {
            if let Ok(value) = session.register(&name).await {
                let _ = writeln!(reply, "{name} = {value}");
            }
        }
        ControlLine::Mem { address, length } => {
            if let Ok(bytes) = session.memory(address, length).await {
                reply.push_str(&hex_dump(address, &bytes));
            }
        }
        ControlLine::Status => {
            if let Ok(completed) = session.is_completed().await {
                let _ = writeln!(reply, "completed: {completed}");
                if completed {
                    if let Ok(status) = session.exit_status().await {
                        match status {
                            Some(code) => {
                                let _ = writeln!(reply, "exit status: {code}");
                            }
                            None => reply.push_str("exit status: none\n"),
                        }
                    }
                }
                let _ = writeln!(reply, "instructions: {}", session.steps_executed());
            }
        }
        ControlLine::Quit => {}
    }
    reply
}

/// Sixteen bytes per row, each row prefixed with its address.
pub fn hex_dump(address: u64, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:#06x}:", address + (row as u64) * 16);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
        out.push('\n');
    }
    out
}
