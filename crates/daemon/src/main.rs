// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `cnagentd`: binds the HTTP adapter, drives the Worker Supervisor, and
//! keeps the sysinfo cache warm for the lifetime of the process.

use std::path::PathBuf;
use std::sync::Arc;

use cnagent_core::{PauseFlag, QueueSet, SystemClock};
use cnagent_engine::sysinfo::ShellSampleSource;
use cnagent_engine::{HeartbeatLoop, Supervisor, SupervisorConfig};
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod http;

use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("CNAGENT_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/etc/cnagent/cnagentd.toml"));
    let config = Config::load(&config_path).unwrap_or_else(|error| {
        eprintln!("failed to load {}: {error}, continuing with defaults", config_path.display());
        Config::default()
    });

    let _log_guard = init_logging(&config);

    let queues = QueueSet::reference();
    let pause = Arc::new(PauseFlag::new());
    let supervisor = Supervisor::new(
        queues,
        Arc::clone(&pause),
        SystemClock,
        SupervisorConfig {
            worker_bin: config.worker_bin.clone(),
            log_dir: config.log_dir.clone(),
            tasks_path: "/tasks".to_string(),
            termination_grace: config.termination_grace,
        },
    );

    let heartbeat = HeartbeatLoop::new(Arc::new(ShellSampleSource));
    let heartbeat_handle = tokio::spawn({
        let heartbeat = Arc::clone(&heartbeat);
        async move {
            if let Err(error) = heartbeat.run().await {
                tracing::error!(%error, "sysinfo heartbeat loop aborted, restarting is left to the service supervisor");
            }
        }
    });

    let bind_addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%bind_addr, %error, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%bind_addr, "cnagentd listening");

    let app = http::router(http::AppState { supervisor: Arc::clone(&supervisor) });
    let serve = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal());
    if let Err(error) = serve.await {
        tracing::error!(%error, "HTTP server exited with an error");
    }

    tracing::info!("shutdown signal received, pausing admission and draining workers");
    pause.pause();
    supervisor.terminate_all().await;
    heartbeat_handle.abort();
}

/// Resolves once on `SIGTERM` or Ctrl-C, whichever arrives first (§4 supplement).
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        #[allow(clippy::expect_used)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match std::fs::create_dir_all(&config.log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&config.log_dir, "cnagentd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).json().with_writer(non_blocking).init();
            Some(guard)
        }
        Err(error) => {
            eprintln!("failed to create log directory {}: {error}, logging to stderr", config.log_dir.display());
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
            None
        }
    }
}
