//! Configuration module for duckgate
//!
//! - `defaults` - Default constants and values
//! - `args` - CLI argument definitions

mod args;
mod defaults;

pub use args::ServerArgs;
pub use defaults::*;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use duckgate_engine::ExportOptions;

use crate::error::{DuckgateError, Result};

/// How export responses for file formats are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportEngine {
    /// Run the query, then encode the rows in-process.
    #[default]
    Codec,
    /// Let DuckDB write csv, ndjson and parquet files with `COPY ... TO`.
    Native,
}

impl FromStr for ExportEngine {
    type Err = DuckgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codec" => Ok(ExportEngine::Codec),
            "native" | "duckdb" => Ok(ExportEngine::Native),
            other => Err(DuckgateError::config(format!(
                "unknown export engine '{}' (expected codec or native)",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportEngine::Codec => write!(f, "codec"),
            ExportEngine::Native => write!(f, "native"),
        }
    }
}

/// Complete server configuration for duckgate.
///
/// # Configuration Sources
///
/// Each setting is taken from the first source that provides it:
/// 1. **Environment variables** - `DUCKGATE_*` prefix
/// 2. **CLI arguments** - Command-line flags
/// 3. **Built-in defaults**
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Database file, or `:memory:`.
    pub db: String,
    /// Log level as given (aliases such as `warning` are kept).
    pub log_level: String,
    pub query_timeout: Duration,
    pub inline_threshold_bytes: usize,
    pub spool_dir: PathBuf,
    pub export_engine: ExportEngine,
    pub upload_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db: DEFAULT_DB.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD_BYTES,
            spool_dir: std::env::temp_dir(),
            export_engine: ExportEngine::Codec,
            upload_limit_mb: DEFAULT_UPLOAD_LIMIT_MB,
        }
    }
}

impl ServerConfig {
    /// Resolve the configuration from the process environment and `args`.
    pub fn resolve(args: ServerArgs) -> Result<Self> {
        Self::resolve_with(args, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with<F>(args: ServerArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            env(&format!("{}{}", ENV_PREFIX, key)).filter(|v| !v.trim().is_empty())
        };

        let host = lookup("HOST")
            .or(args.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => parse_env("PORT", &raw)?,
            None => args.port.unwrap_or(DEFAULT_PORT),
        };
        let db = lookup("DB")
            .or(args.db)
            .unwrap_or_else(|| DEFAULT_DB.to_string());
        let log_level = lookup("LOG_LEVEL")
            .or(args.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
            .to_ascii_lowercase();
        let query_timeout_ms = match lookup("QUERY_TIMEOUT_MS") {
            Some(raw) => parse_env("QUERY_TIMEOUT_MS", &raw)?,
            None => args.query_timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
        };
        let inline_threshold_bytes = match lookup("INLINE_THRESHOLD_BYTES") {
            Some(raw) => parse_env("INLINE_THRESHOLD_BYTES", &raw)?,
            None => args
                .inline_threshold_bytes
                .unwrap_or(DEFAULT_INLINE_THRESHOLD_BYTES),
        };
        let spool_dir = lookup("SPOOL_DIR")
            .map(PathBuf::from)
            .or(args.spool_dir)
            .unwrap_or_else(std::env::temp_dir);
        let export_engine = lookup("EXPORT_ENGINE")
            .or(args.export_engine)
            .unwrap_or_else(|| DEFAULT_EXPORT_ENGINE.to_string())
            .parse()?;
        let upload_limit_mb = match lookup("UPLOAD_LIMIT_MB") {
            Some(raw) => parse_env("UPLOAD_LIMIT_MB", &raw)?,
            None => args.upload_limit_mb.unwrap_or(DEFAULT_UPLOAD_LIMIT_MB),
        };

        Ok(Self {
            host,
            port,
            db,
            log_level,
            query_timeout: Duration::from_millis(query_timeout_ms),
            inline_threshold_bytes,
            spool_dir,
            export_engine,
            upload_limit_mb,
        })
    }

    /// Validate the configuration before starting the server.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(DuckgateError::config(format!(
                "unknown log level '{}' (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.host.trim().is_empty() {
            return Err(DuckgateError::config("host must not be empty"));
        }
        if self.query_timeout.is_zero() {
            return Err(DuckgateError::config("query timeout must be greater than zero"));
        }
        if self.upload_limit_mb == 0 {
            return Err(DuckgateError::config("upload limit must be greater than zero"));
        }
        if !self.spool_dir.is_dir() {
            return Err(DuckgateError::config(format!(
                "spool directory {} does not exist",
                self.spool_dir.display()
            )));
        }
        Ok(())
    }

    /// The `tracing` filter directive for the configured log level.
    pub fn log_filter(&self) -> &str {
        match self.log_level.as_str() {
            "warning" => "warn",
            "critical" => "error",
            other => other,
        }
    }

    /// Query timeout in whole milliseconds, as reported in errors.
    pub fn query_timeout_ms(&self) -> u64 {
        u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn upload_limit_bytes(&self) -> usize {
        self.upload_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            spool_dir: self.spool_dir.clone(),
            inline_threshold: self.inline_threshold_bytes,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        DuckgateError::config(format!("invalid value '{}' for {}{}", raw, ENV_PREFIX, key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_without_env_or_flags() {
        let config = ServerConfig::resolve_with(ServerArgs::default(), env_of(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db, ":memory:");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.export_engine, ExportEngine::Codec);
        assert_eq!(config.upload_limit_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_env_beats_flags_beats_defaults() {
        let args = ServerArgs {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
            db: Some("cli.duckdb".into()),
            ..Default::default()
        };
        let env = env_of(&[("DUCKGATE_PORT", "9000"), ("DUCKGATE_DB", "env.duckdb")]);
        let config = ServerConfig::resolve_with(args, env).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.db, "env.duckdb");
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let args = ServerArgs {
            port: Some(8080),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(args, env_of(&[("DUCKGATE_PORT", " ")])).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = ServerConfig::resolve_with(
            ServerArgs::default(),
            env_of(&[("DUCKGATE_QUERY_TIMEOUT_MS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DUCKGATE_QUERY_TIMEOUT_MS"));
    }

    #[test]
    fn test_export_engine_parsing() {
        assert_eq!("native".parse::<ExportEngine>().unwrap(), ExportEngine::Native);
        assert_eq!("Codec".parse::<ExportEngine>().unwrap(), ExportEngine::Codec);
        assert!("pandas".parse::<ExportEngine>().is_err());
    }

    #[test]
    fn test_log_level_aliases() {
        let mut config = ServerConfig::default();
        config.log_level = "warning".into();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter(), "warn");

        config.log_level = "critical".into();
        assert_eq!(config.log_filter(), "error");

        config.log_level = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_missing_spool_dir() {
        let mut config = ServerConfig::default();
        config.query_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.spool_dir = PathBuf::from("/definitely/not/a/real/spool/dir");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_export_options_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            spool_dir: dir.path().to_path_buf(),
            inline_threshold_bytes: 64,
            ..Default::default()
        };
        let options = config.export_options();
        assert_eq!(options.spool_dir, dir.path());
        assert_eq!(options.inline_threshold, 64);
    }
}
