//! Run a loaded program to completion.

use anyhow::{bail, Context};
use simterm_console::{RunOutcome, Session};
use simterm_worker::ControlError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::Renderer;

/// Run until the program completes, feeding `input` lines whenever it waits.
///
/// Program output is written to `output` as it appears. Returns the exit
/// status, which is the fault status when the program ended in a fault.
pub async fn run<R, W>(
    session: &mut Session,
    mut input: R,
    output: &mut W,
    max_steps: Option<usize>,
) -> anyhow::Result<i64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut renderer = Renderer::default();

    loop {
        let budget = max_steps.map(|limit| limit.saturating_sub(session.steps_executed()));
        let outcome = session.run(budget).await;
        flush(session, &mut renderer, output).await?;

        match outcome {
            Ok(RunOutcome::Completed { exit_status }) => {
                info!(?exit_status, "program completed");
                return exit_status.context("program completed without an exit status");
            }
            Ok(RunOutcome::AwaitingInput) => {
                let mut line = String::new();
                let read = input
                    .read_line(&mut line)
                    .await
                    .context("failed to read program input")?;
                if read == 0 {
                    bail!("program is waiting for input but stdin is closed");
                }
                let line = line.trim_end_matches(['\n', '\r']);
                debug!(bytes = line.len(), "forwarding input line");
                session.submit_line(line).await?;
                // The submitted line is already on the user's terminal.
                renderer.skip(&session.console());
            }
            Ok(RunOutcome::StepLimit { .. }) => {
                bail!(
                    "step limit reached after {} instructions",
                    session.steps_executed()
                )
            }
            Ok(RunOutcome::Stopped) => bail!("program was stopped"),
            Err(ControlError::ExecutionFault(message)) => {
                info!(%message, "program faulted");
                let status = session.exit_status().await?;
                flush(session, &mut renderer, output).await?;
                match status {
                    Some(status) => return Ok(status),
                    None => bail!("program faulted without completing: {message}"),
                }
            }
            Err(error) => return Err(error.into()),
        }
    }
}

async fn flush<W: AsyncWrite + Unpin>(
    session: &Session,
    renderer: &mut Renderer,
    output: &mut W,
) -> anyhow::Result<()> {
    let text = renderer.take_new(&session.console());
    if !text.is_empty() {
        output.write_all(text.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
