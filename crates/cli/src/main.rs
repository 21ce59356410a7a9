// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `cnagent`: admin client for `cnagentd`'s HTTP surface (admit, pause,
//! resume, history).

mod client;
mod color;
mod exit_error;

use anyhow::Result;
use clap::{Parser, Subcommand};
use exit_error::ExitError;

use client::DaemonClient;

const DEFAULT_DAEMON_ADDR: &str = "http://127.0.0.1:5309";

#[derive(Parser)]
#[command(name = "cnagent", version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")), styles = color::styles())]
struct Cli {
    /// Base URL of the running `cnagentd` admin surface.
    #[arg(long, env = "CNAGENT_ADDR", default_value = DEFAULT_DAEMON_ADDR)]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Admit a new task of the given kind.
    Admit {
        /// Registered task kind, e.g. `machine_boot`.
        task: String,
        /// Task body as a JSON literal (defaults to `{}`).
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Flip the Pause Flag: stop admitting new tasks.
    Pause,
    /// Clear the Pause Flag.
    Resume,
    /// Print task history plus currently running records.
    History,
    /// Print a snapshot of in-flight and recently-finished tasks.
    Tasks,
    /// Check daemon liveness.
    Healthz,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        if let Some(exit) = error.downcast_ref::<ExitError>() {
            eprintln!("{}", exit.message);
            std::process::exit(exit.code);
        }
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(cli.addr);

    match cli.command {
        Command::Admit { task, params } => {
            let params: serde_json::Value = serde_json::from_str(&params).map_err(|error| ExitError::new(2, format!("invalid --params JSON: {error}")))?;
            let id = client.admit(&task, params).await?;
            println!("{id}");
        }
        Command::Pause => {
            client.pause().await?;
            println!("paused");
        }
        Command::Resume => {
            client.resume().await?;
            println!("resumed");
        }
        Command::History => {
            let history = client.history().await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Tasks => {
            let tasks = client.tasks().await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::Healthz => {
            client.healthz().await?;
            println!("ok");
        }
    }
    Ok(())
}
