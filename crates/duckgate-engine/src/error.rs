//! Error types for the duckgate engine.
//!
//! Every failure the table store, query builder or format codecs can produce
//! is a variant of [`EngineError`]. The HTTP layer maps these to status codes
//! in exactly one place, so the variants carry enough context to diagnose the
//! problem (table, column, failing SQL) but never local file-system paths.

/// Maximum number of characters of SQL echoed back inside an error message.
const SQL_PREVIEW_CHARS: usize = 120;

/// Errors from the table store, query builder and codecs.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The named table does not resolve in the store.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists; creation never overwrites.
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    /// A table definition was rejected (unknown type, empty or duplicate columns).
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A table or column name failed the identifier allow-list.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Inserted data does not fit the target table.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The store rejected a column reference.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Only part of a pivot specification was supplied.
    #[error("Invalid pivot spec: {0}")]
    InvalidPivotSpec(String),

    /// A filter predicate is not a single self-contained expression.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The requested wire format is not one of json, ndjson, csv or parquet.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Any native store failure (malformed SQL, constraint violation, ...).
    #[error("Query error: {message}")]
    QueryError {
        /// Store diagnostic, usually followed by a preview of the failing SQL.
        message: String,
    },

    /// A value could not be represented in the target format.
    #[error("Encoding failure: {cause}")]
    EncodingFailure {
        /// What could not be encoded or decoded.
        cause: String,
    },

    /// The statement did not finish within the configured timeout.
    #[error("Query timed out after {timeout_ms}ms")]
    QueryTimeout {
        /// The timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The underlying connection has been closed.
    #[error("Table store is unavailable")]
    StoreUnavailable,

    /// Local I/O failed while spooling an export or an upload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a `QueryError` carrying a preview of the offending SQL.
    ///
    /// # Examples
    ///
    /// ```
    /// use duckgate_engine::EngineError;
    ///
    /// let err = EngineError::query("SELECT * FORM t", "syntax error at or near \"FORM\"");
    /// assert!(err.to_string().contains("syntax error"));
    /// assert!(err.to_string().contains("SELECT * FORM t"));
    /// ```
    pub fn query(sql: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if sql.is_empty() {
            return Self::QueryError { message: detail };
        }
        Self::QueryError {
            message: format!("{} (query: {})", detail, sql_preview(sql)),
        }
    }

    /// Create an `EncodingFailure`.
    pub fn encoding(cause: impl Into<String>) -> Self {
        Self::EncodingFailure {
            cause: cause.into(),
        }
    }

    /// Classify a native DuckDB error raised while running `sql`.
    ///
    /// DuckDB reports every failure as a message string prefixed with its
    /// error class (`Catalog Error`, `Binder Error`, ...), so classification
    /// is a matter of recognising those prefixes.
    pub fn from_duckdb(err: duckdb::Error, sql: &str) -> Self {
        classify_message(err.to_string(), sql)
    }
}

impl From<duckdb::Error> for EngineError {
    fn from(e: duckdb::Error) -> Self {
        classify_message(e.to_string(), "")
    }
}

impl From<arrow::error::ArrowError> for EngineError {
    fn from(e: arrow::error::ArrowError) -> Self {
        EngineError::encoding(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for EngineError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        EngineError::encoding(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::encoding(e.to_string())
    }
}

fn classify_message(msg: String, sql: &str) -> EngineError {
    if msg.contains("Catalog Error") {
        if let Some(name) = between(&msg, "Table with name ", " does not exist") {
            return EngineError::TableNotFound(name.to_string());
        }
        if msg.contains("Type with name") {
            return EngineError::InvalidSchema(msg);
        }
        if let Some(name) = between(&msg, "Table with name \"", "\" already exists") {
            return EngineError::TableAlreadyExists(name.to_string());
        }
        if msg.contains("already exists") {
            return EngineError::TableAlreadyExists(msg);
        }
    }
    if msg.contains("Binder Error")
        && (msg.contains("Referenced column") || msg.contains("not found in FROM clause"))
    {
        return EngineError::UnknownColumn(msg);
    }
    EngineError::query(sql, msg)
}

fn between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let rest = &haystack[from..];
    let to = rest.find(end)?;
    Some(rest[..to].trim_matches('"'))
}

fn sql_preview(sql: &str) -> String {
    let sql = sql.trim();
    if sql.chars().count() > SQL_PREVIEW_CHARS {
        let head: String = sql.chars().take(SQL_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        sql.to_string()
    }
}

/// A specialised `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_is_classified() {
        let err = classify_message(
            "Catalog Error: Table with name orders does not exist!\nDid you mean \"order_items\"?"
                .to_string(),
            "SELECT * FROM orders",
        );
        assert!(matches!(err, EngineError::TableNotFound(ref t) if t == "orders"));
    }

    #[test]
    fn test_unknown_column_is_classified() {
        let err = classify_message(
            "Binder Error: Referenced column \"nope\" not found in FROM clause!".to_string(),
            "SELECT nope FROM t",
        );
        assert!(matches!(err, EngineError::UnknownColumn(_)));
    }

    #[test]
    fn test_unknown_type_is_invalid_schema() {
        let err = classify_message(
            "Catalog Error: Type with name WIDGET does not exist!".to_string(),
            "CREATE TABLE t (a WIDGET)",
        );
        assert!(matches!(err, EngineError::InvalidSchema(_)));
    }

    #[test]
    fn test_other_errors_keep_sql_preview() {
        let long_sql = format!("SELECT {}", "x, ".repeat(100));
        let err = classify_message("Parser Error: syntax error".to_string(), &long_sql);
        let msg = err.to_string();
        assert!(msg.starts_with("Query error: Parser Error"));
        assert!(msg.ends_with("...)"));
    }
}
