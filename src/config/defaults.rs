//! Default constants for duckgate configuration
//!
//! These constants define the values used when neither an environment
//! variable nor a command-line flag provides one.

/// Prefix shared by every configuration environment variable
pub const ENV_PREFIX: &str = "DUCKGATE_";

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default database location (in-process, non-persistent)
pub const DEFAULT_DB: &str = duckgate_engine::IN_MEMORY;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default statement timeout in milliseconds
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

/// Default largest ndjson export kept in memory (1 MiB)
pub const DEFAULT_INLINE_THRESHOLD_BYTES: usize = duckgate_engine::codec::DEFAULT_INLINE_THRESHOLD;

/// Default export engine ("codec" or "native")
pub const DEFAULT_EXPORT_ENGINE: &str = "codec";

/// Default request body limit for uploads and bulk inserts, in MiB
pub const DEFAULT_UPLOAD_LIMIT_MB: usize = 100;

/// Log levels accepted on the command line, including the aliases kept for
/// older deployments (`warning`, `critical`).
pub const LOG_LEVELS: &[&str] = &[
    "trace", "debug", "info", "warn", "warning", "error", "critical",
];
