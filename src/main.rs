//! duckgate - HTTP gateway over an embedded DuckDB database.

use clap::Parser;
use duckgate::{DuckgateError, Result, ServerArgs, ServerConfig};
use duckgate_engine::TableStore;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("duckgate failed to start: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::resolve(args)?;
    config.validate()?;

    // RUST_LOG wins over the configured level.
    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        db = %config.db,
        log_level = %config.log_level,
        export_engine = %config.export_engine,
        "Starting duckgate"
    );

    let store = match TableStore::open(&config.db) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, db = %config.db, "Failed to open database");
            return Err(e.into());
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DuckgateError::Server(format!("failed to create Tokio runtime: {}", e)))?;
    runtime.block_on(duckgate::serve(config, store))
}
