//! Simterm Run - executes an assembly program through the control plane
//!
//! The machine runs in its own execution context; this process talks to it
//! only through the controller, exactly as a UI would.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use simterm_console::{ResetRegistry, Session};
use simterm_engine::{Machine, MachineConfig};
use simterm_run::cli::Cli;
use simterm_run::{batch, interactive};
use simterm_worker::Controller;
use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    simterm_run::init_logging();

    let cli = Cli::parse();
    let config = match cli.machine_config() {
        Ok(config) => config,
        Err(err) => err.exit(),
    };

    match run(cli, config).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, config: MachineConfig) -> anyhow::Result<i32> {
    info!("Loading program from: {}", cli.program.display());
    let source = simterm_run::read_program(&cli.program).await?;

    let (controller, prints, context) = Controller::spawn(move || Machine::new(config))
        .context("failed to start execution context")?;

    let registry = Arc::new(ResetRegistry::new());
    let mut session = Session::new(controller.clone(), prints, registry);
    session.start().await?;
    session
        .load(&source)
        .await
        .with_context(|| format!("failed to load {}", cli.program.display()))?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    let code = if cli.interactive {
        interactive::run(&mut session, &cli.program, stdin, &mut stdout, cli.max_steps).await?;
        0
    } else {
        let status = batch::run(&mut session, stdin, &mut stdout, cli.max_steps).await?;
        info!("Program exited with status {status}");
        i32::try_from(status).unwrap_or(i32::MAX)
    };

    controller.disconnect();
    drop(session);
    tokio::task::spawn_blocking(move || context.join())
        .await?
        .map_err(|_| anyhow!("execution context panicked"))?;

    Ok(code)
}
