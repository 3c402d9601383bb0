//! Task board server.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9000
//! cargo run --bin taskboard-server
//!
//! # Run on custom address with a config file
//! cargo run --bin taskboard-server -- --bind 127.0.0.1:8080 --config board.toml
//!
//! # Or via environment variables
//! TASKBOARD_ADDR=127.0.0.1:8080 TASKBOARD_LOG=debug cargo run --bin taskboard-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use taskboard_server::audit::InMemoryAuditLog;
use taskboard_server::config::{BoardCliArgs, BoardConfig};
use taskboard_server::server::{self, BoardState};
use taskboard_server::store::InMemoryTaskStore;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = BoardCliArgs::parse();

    let config = match BoardConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until exit so buffered log lines are flushed.
    let _guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(addr = %config.bind_addr, "starting task board server");

    let auth = config.authenticator();
    if auth.is_empty() {
        tracing::warn!("no users configured; every connection will be rejected");
    } else {
        tracing::info!(users = auth.len(), "loaded token table");
    }

    let state = Arc::new(BoardState::with_config(
        config.max_frame_size,
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(InMemoryAuditLog::with_capacity(config.audit_capacity)),
        Arc::new(auth),
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "board server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "board server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start board server");
            std::process::exit(1);
        }
    }
}

/// Initializes tracing to stderr, or to `file_path` through a non-blocking
/// writer whose guard is returned.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
