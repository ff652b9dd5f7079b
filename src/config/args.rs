//! Command-line arguments for the duckgate server
//!
//! Every flag is optional: unset flags fall through to the defaults in
//! [`super::defaults`], and `DUCKGATE_*` environment variables take
//! precedence over both (see [`super::ServerConfig::resolve`]).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the duckgate server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "duckgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP gateway over an embedded DuckDB database")]
pub struct ServerArgs {
    /// Host to bind the HTTP server to [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [default: 3000]
    #[arg(long)]
    pub port: Option<u16>,

    /// DuckDB database file, or ":memory:" for an in-process database
    #[arg(long)]
    pub db: Option<String>,

    /// Log level (trace, debug, info, warning, error, critical) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Statement timeout in milliseconds [default: 30000]
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Largest ndjson export kept in memory before spilling to disk [default: 1048576]
    #[arg(long)]
    pub inline_threshold_bytes: Option<usize>,

    /// Directory for temporary export and upload files [default: system temp dir]
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,

    /// Export engine: "codec" encodes results in-process, "native" uses
    /// DuckDB's COPY for csv, ndjson and parquet [default: codec]
    #[arg(long)]
    pub export_engine: Option<String>,

    /// Request body limit for uploads and bulk inserts, in MiB [default: 100]
    #[arg(long)]
    pub upload_limit_mb: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_optional() {
        let args = ServerArgs::try_parse_from(["duckgate"]).unwrap();
        assert!(args.host.is_none());
        assert!(args.port.is_none());
        assert!(args.db.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let args = ServerArgs::try_parse_from([
            "duckgate",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--db",
            "data.duckdb",
            "--log-level",
            "debug",
            "--export-engine",
            "native",
        ])
        .unwrap();
        assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.db.as_deref(), Some("data.duckdb"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.export_engine.as_deref(), Some("native"));
    }

    #[test]
    fn test_rejects_non_numeric_port() {
        assert!(ServerArgs::try_parse_from(["duckgate", "--port", "http"]).is_err());
    }
}
