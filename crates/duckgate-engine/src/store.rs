//! DuckDB-backed table store.
//!
//! [`TableStore`] owns a single DuckDB connection, either on a database file
//! or in memory. Every operation takes the connection lock for its whole
//! duration, so schema changes, bulk inserts and reads never interleave.
//! Nothing is cached: schema is read from `information_schema` each time it
//! is needed.
//!
//! # Examples
//!
//! ```
//! use duckgate_engine::{NamedParams, TableStore};
//!
//! let store = TableStore::open_in_memory().unwrap();
//! store
//!     .create_table("t", &[("id".into(), "INTEGER".into()), ("name".into(), "TEXT".into())])
//!     .unwrap();
//! assert_eq!(store.list_tables().unwrap(), vec!["t".to_string()]);
//!
//! let rows = store.execute_sql("SELECT 42 AS answer", &NamedParams::new()).unwrap();
//! assert_eq!(rows.columns(), &["answer"]);
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use duckdb::{params, params_from_iter, Connection};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{self, DataFormat};
use crate::error::{EngineError, Result};
use crate::ident::{normalize_type_name, quote, quote_literal, Identifier};
use crate::params::{bind_named, NamedParams};
use crate::query::{QueryBuilder, QueryPlan, QuerySource, QuerySpec};
use crate::value::{ResultSet, Value};

/// Location string selecting an in-process database.
pub const IN_MEMORY: &str = ":memory:";

const REDACTED_PATH: &str = "<file>";

/// One column of a table, as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip)]
    pub has_default: bool,
}

/// A table's name and ordered columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Column by name; DuckDB identifiers are case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Shared handle to an embedded DuckDB database.
pub struct TableStore {
    /// `None` once closed.
    conn: Mutex<Option<Connection>>,
    location: String,
}

impl TableStore {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(location: &str) -> Result<Self> {
        let conn = if location == IN_MEMORY || location.is_empty() {
            Connection::open_in_memory()?
        } else {
            Connection::open(location)?
        };
        info!(location = %location, "Opened table store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            location: location.to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Close the connection. Every later call fails with `StoreUnavailable`.
    pub fn close(&self) {
        if let Some(conn) = self.conn.lock().take() {
            match conn.close() {
                Ok(()) => info!(location = %self.location, "Closed table store"),
                Err((_, e)) => warn!(error = %e, "Table store did not close cleanly"),
            }
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(EngineError::StoreUnavailable)?;
        f(conn)
    }

    // ── Catalog ──────────────────────────────────────────────────────────

    /// Names of all tables and views in the current schema.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        const SQL: &str = "SELECT table_name FROM information_schema.tables \
                           WHERE table_schema = current_schema() ORDER BY table_name";
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(SQL)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }

    /// Ordered column definitions of `table`.
    pub fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let table = Identifier::parse(table)?;
        self.with_conn(|conn| schema_of(conn, table.as_str()))
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let table = Identifier::parse(table)?;
        self.with_conn(|conn| count_rows(conn, &table))
    }

    /// Create `table` with the given `(column, type)` pairs, in order.
    ///
    /// Fails with `TableAlreadyExists` rather than replacing an existing table.
    pub fn create_table(&self, table: &str, columns: &[(String, String)]) -> Result<()> {
        let table = Identifier::parse(table)?;
        if columns.is_empty() {
            return Err(EngineError::InvalidSchema(format!(
                "table '{}' needs at least one column",
                table
            )));
        }

        let mut definitions = Vec::with_capacity(columns.len());
        let mut seen: Vec<String> = Vec::with_capacity(columns.len());
        for (name, data_type) in columns {
            let column = Identifier::parse(name)?;
            let lowered = column.as_str().to_ascii_lowercase();
            if seen.contains(&lowered) {
                return Err(EngineError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    column
                )));
            }
            seen.push(lowered);
            definitions.push(format!("{} {}", column.quoted(), normalize_type_name(data_type)?));
        }

        let sql = format!("CREATE TABLE {} ({})", table.quoted(), definitions.join(", "));
        self.with_conn(|conn| {
            if table_exists(conn, table.as_str())? {
                return Err(EngineError::TableAlreadyExists(table.to_string()));
            }
            debug!(sql = %sql, "Executing statement");
            conn.execute_batch(&sql)
                .map_err(|e| EngineError::from_duckdb(e, &sql))?;
            Ok(())
        })?;
        info!(table = %table, columns = columns.len(), "Created table");
        Ok(())
    }

    /// Drop `table` if it exists. Dropping a missing table succeeds.
    ///
    /// Views are listed alongside tables, so a view of that name is dropped
    /// as a view.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        let table = Identifier::parse(table)?;
        self.with_conn(|conn| {
            let kind = match table_type(conn, table.as_str())?.as_deref() {
                Some("VIEW") => "VIEW",
                _ => "TABLE",
            };
            let sql = format!("DROP {} IF EXISTS {}", kind, table.quoted());
            debug!(sql = %sql, "Executing statement");
            conn.execute_batch(&sql)
                .map_err(|e| EngineError::from_duckdb(e, &sql))
        })?;
        info!(table = %table, "Dropped table");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Run one statement with `$name` parameters bound by the store.
    pub fn execute_sql(&self, sql: &str, params: &NamedParams) -> Result<ResultSet> {
        let (rewritten, values) = bind_named(sql, params)?;
        self.with_conn(|conn| run_query(conn, sql, &rewritten, &values))
    }

    /// Plan and run `spec` over `source`.
    ///
    /// Pivot values are resolved under the same lock as the pivot itself, so
    /// a concurrent insert cannot add a value the column list misses.
    pub fn query(&self, source: &QuerySource, spec: &QuerySpec, params: &NamedParams) -> Result<ResultSet> {
        self.with_conn(|conn| {
            let plan = plan_on(conn, source, spec, params)?;
            run_plan(conn, &plan, params)
        })
    }

    /// Insert every row of `rows` into `table` inside one transaction.
    ///
    /// Input columns must exist in the table; columns left out must be
    /// nullable or have a default. Each value is coerced to its column's
    /// declared type first. Any failure rolls the whole batch back.
    pub fn insert_rows(&self, table: &str, rows: &ResultSet) -> Result<u64> {
        let table = Identifier::parse(table)?;
        self.with_conn(|conn| {
            let schema = schema_of(conn, table.as_str())?;
            let targets = resolve_targets(&schema, rows)?;
            if rows.is_empty() {
                return Ok(0);
            }

            let column_list = targets
                .iter()
                .map(|c| quote(&c.name))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; targets.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.quoted(),
                column_list,
                placeholders
            );
            debug!(sql = %sql, rows = rows.len(), "Executing batch insert");

            let tx = conn.transaction()?;
            {
                let mut stmt = tx
                    .prepare(&sql)
                    .map_err(|e| EngineError::from_duckdb(e, &sql))?;
                for (n, row) in rows.rows().iter().enumerate() {
                    let coerced = coerce_row(&targets, row, n)?;
                    stmt.execute(params_from_iter(coerced.iter().map(Value::to_duckdb)))
                        .map_err(|e| EngineError::from_duckdb(e, &sql))?;
                }
            }
            tx.commit()?;
            info!(table = %table, rows = rows.len(), "Inserted rows");
            Ok(rows.len() as u64)
        })
    }

    // ── Files ────────────────────────────────────────────────────────────

    /// Read a CSV, JSON, NDJSON or Parquet file through DuckDB's readers.
    pub fn read_file(&self, path: &Path, format: DataFormat) -> Result<ResultSet> {
        let literal = quote_literal(&path.to_string_lossy());
        let sql = format!("SELECT * FROM {}({})", reader_function(format), literal);
        let shown = redact_sql(&sql, path);
        self.with_conn(|conn| run_query(conn, &shown, &sql, &[]))
            .map_err(|e| redact(e, path))
    }

    /// Write the result of `sql` to `path` with DuckDB's `COPY ... TO`.
    ///
    /// `json` has no native envelope, so it is encoded by the codec instead.
    pub fn write_query(
        &self,
        sql: &str,
        params: &NamedParams,
        path: &Path,
        format: DataFormat,
    ) -> Result<()> {
        let Some(options) = copy_options(format) else {
            let rows = self.execute_sql(sql, params)?;
            return self.write_file(&rows, path, format);
        };

        let (rewritten, values) = bind_named(sql, params)?;
        self.with_conn(|conn| copy_to(conn, &rewritten, &values, path, options))
            .map_err(|e| redact(e, path))
    }

    /// Plan `spec` over `source` and write the result to `path`, holding the
    /// connection from pivot lookup to the last written row.
    pub fn export_query(
        &self,
        source: &QuerySource,
        spec: &QuerySpec,
        params: &NamedParams,
        path: &Path,
        format: DataFormat,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let plan = plan_on(conn, source, spec, params)?;
            match copy_options(format) {
                Some(options) => {
                    let (rewritten, values) = bind_named(&plan.sql, params)?;
                    copy_to(conn, &rewritten, &values, path, options)
                }
                None => {
                    let rows = run_plan(conn, &plan, params)?;
                    codec::encode(&rows, format, BufWriter::new(File::create(path)?))
                }
            }
        })
        .map_err(|e| redact(e, path))
    }

    /// Write `rows` to `path` in the given format.
    pub fn write_file(&self, rows: &ResultSet, path: &Path, format: DataFormat) -> Result<()> {
        let file = File::create(path).map_err(|e| redact(e.into(), path))?;
        codec::encode(rows, format, BufWriter::new(file)).map_err(|e| redact(e, path))
    }

    /// Create `table` from the contents of a file.
    ///
    /// Fails with `TableAlreadyExists` if the name is taken. Returns the
    /// number of rows loaded.
    pub fn import_file(&self, table: &str, path: &Path, format: DataFormat) -> Result<u64> {
        let table = Identifier::parse(table)?;
        let sql = format!(
            "CREATE TABLE {} AS SELECT * FROM {}({})",
            table.quoted(),
            reader_function(format),
            quote_literal(&path.to_string_lossy())
        );
        let shown = redact_sql(&sql, path);
        let count = self
            .with_conn(|conn| {
                if table_exists(conn, table.as_str())? {
                    return Err(EngineError::TableAlreadyExists(table.to_string()));
                }
                debug!(sql = %shown, "Executing import");
                conn.execute_batch(&sql)
                    .map_err(|e| EngineError::from_duckdb(e, &shown))?;
                count_rows(conn, &table)
            })
            .map_err(|e| redact(e, path))?;
        info!(table = %table, rows = count, format = %format, "Imported file");
        Ok(count)
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Prepare and run `sql`, reporting errors against `shown`.
fn run_query(conn: &Connection, shown: &str, sql: &str, values: &[Value]) -> Result<ResultSet> {
    debug!(sql = %shown, params = values.len(), "Executing statement");
    let map_err = |e| EngineError::from_duckdb(e, shown);

    let mut stmt = conn.prepare(sql).map_err(map_err)?;
    let mut rows = stmt
        .query(params_from_iter(values.iter().map(Value::to_duckdb)))
        .map_err(map_err)?;
    let (columns, width) = match rows.as_ref() {
        Some(stmt) => (stmt.column_names(), stmt.column_count()),
        None => (Vec::new(), 0),
    };

    let mut data = Vec::new();
    while let Some(row) = rows.next().map_err(map_err)? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from_duckdb(row.get_ref(i).map_err(map_err)?));
        }
        data.push(values);
    }
    ResultSet::with_deduplicated_columns(columns, data)
}

/// Build the plan for `spec`, looking up pivot values first when needed.
fn plan_on(
    conn: &Connection,
    source: &QuerySource,
    spec: &QuerySpec,
    params: &NamedParams,
) -> Result<QueryPlan> {
    let domain_query = match QueryBuilder::pivot_domain(source, spec) {
        Some(query) if spec.needs_pivot_domain() => query,
        _ => return Ok(QueryBuilder::build(source, spec)),
    };
    let values = run_plan(conn, &domain_query, params)?;
    let domain: Vec<String> = values
        .rows()
        .iter()
        .filter_map(|row| row.first().and_then(Value::render_text))
        .collect();
    debug!(values = domain.len(), "Resolved pivot columns");
    Ok(QueryBuilder::build(source, &spec.with_pivot_domain(domain)))
}

fn run_plan(conn: &Connection, plan: &QueryPlan, params: &NamedParams) -> Result<ResultSet> {
    let (rewritten, values) = bind_named(&plan.sql, params)?;
    run_query(conn, &plan.sql, &rewritten, &values)
}

/// `COPY (sql) TO path`; errors still carry the path and need redacting.
fn copy_to(conn: &Connection, sql: &str, values: &[Value], path: &Path, options: &str) -> Result<()> {
    let body = sql.trim().trim_end_matches(';');
    let copy = format!(
        "COPY ({}) TO {} ({})",
        body,
        quote_literal(&path.to_string_lossy()),
        options
    );
    let shown = redact_sql(&copy, path);
    debug!(sql = %shown, "Executing export");
    let mut stmt = conn
        .prepare(&copy)
        .map_err(|e| EngineError::from_duckdb(e, &shown))?;
    stmt.execute(params_from_iter(values.iter().map(Value::to_duckdb)))
        .map_err(|e| EngineError::from_duckdb(e, &shown))?;
    Ok(())
}

/// `BASE TABLE` or `VIEW`, or `None` when nothing has that name.
fn table_type(conn: &Connection, table: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT table_type FROM information_schema.tables \
         WHERE table_schema = current_schema() AND lower(table_name) = lower(?)",
    )?;
    let mut rows = stmt.query(params![table])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    Ok(table_type(conn, table)?.is_some())
}

fn schema_of(conn: &Connection, table: &str) -> Result<TableSchema> {
    let mut stmt = conn.prepare(
        "SELECT table_name, column_name, data_type, is_nullable, column_default \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() AND lower(table_name) = lower(?) \
         ORDER BY ordinal_position",
    )?;
    let mut name = None;
    let mut columns = Vec::new();
    let mut rows = stmt.query(params![table])?;
    while let Some(row) = rows.next()? {
        name.get_or_insert(row.get::<_, String>(0)?);
        columns.push(ColumnDef {
            name: row.get(1)?,
            data_type: row.get(2)?,
            nullable: row.get::<_, String>(3)? == "YES",
            has_default: row.get::<_, Option<String>>(4)?.is_some(),
        });
    }
    match name {
        Some(name) => Ok(TableSchema { name, columns }),
        None => Err(EngineError::TableNotFound(table.to_string())),
    }
}

fn count_rows(conn: &Connection, table: &Identifier) -> Result<u64> {
    let sql = format!("SELECT count(*) FROM {}", table.quoted());
    let count: i64 = conn
        .query_row(&sql, [], |row| row.get(0))
        .map_err(|e| EngineError::from_duckdb(e, &sql))?;
    Ok(count.max(0) as u64)
}

/// Match input columns to table columns and check required columns are present.
fn resolve_targets<'a>(schema: &'a TableSchema, rows: &ResultSet) -> Result<Vec<&'a ColumnDef>> {
    let mut targets = Vec::with_capacity(rows.columns().len());
    for name in rows.columns() {
        let column = schema.column(name).ok_or_else(|| {
            EngineError::SchemaMismatch(format!(
                "column '{}' does not exist in table '{}'",
                name, schema.name
            ))
        })?;
        if targets.iter().any(|t: &&ColumnDef| t.name == column.name) {
            return Err(EngineError::SchemaMismatch(format!(
                "column '{}' is given more than once",
                column.name
            )));
        }
        targets.push(column);
    }
    for column in &schema.columns {
        let provided = targets.iter().any(|t| t.name == column.name);
        if !provided && !column.nullable && !column.has_default {
            return Err(EngineError::SchemaMismatch(format!(
                "required column '{}' is missing and has no default",
                column.name
            )));
        }
    }
    Ok(targets)
}

fn coerce_row(targets: &[&ColumnDef], row: &[Value], index: usize) -> Result<Vec<Value>> {
    targets
        .iter()
        .zip(row)
        .map(|(column, value)| {
            if value.is_null() && !column.nullable {
                return Err(EngineError::SchemaMismatch(format!(
                    "row {}: column '{}' cannot be null",
                    index + 1,
                    column.name
                )));
            }
            value.coerce_to(&column.data_type).map_err(|reason| {
                EngineError::SchemaMismatch(format!(
                    "row {}: column '{}' ({}): {}",
                    index + 1,
                    column.name,
                    column.data_type,
                    reason
                ))
            })
        })
        .collect()
}

fn reader_function(format: DataFormat) -> &'static str {
    match format {
        DataFormat::Csv => "read_csv_auto",
        DataFormat::Json => "read_json_auto",
        DataFormat::Ndjson => "read_ndjson_auto",
        DataFormat::Parquet => "read_parquet",
    }
}

fn copy_options(format: DataFormat) -> Option<&'static str> {
    match format {
        DataFormat::Csv => Some("FORMAT CSV, HEADER"),
        DataFormat::Ndjson => Some("FORMAT JSON"),
        DataFormat::Parquet => Some("FORMAT PARQUET"),
        DataFormat::Json => None,
    }
}

fn redact_sql(sql: &str, path: &Path) -> String {
    sql.replace(path.to_string_lossy().as_ref(), REDACTED_PATH)
}

/// Strip a local path from an error message.
fn redact(err: EngineError, path: &Path) -> EngineError {
    let path = path.to_string_lossy();
    let scrub = |text: String| text.replace(path.as_ref(), REDACTED_PATH);
    match err {
        EngineError::QueryError { message } => EngineError::QueryError {
            message: scrub(message),
        },
        EngineError::EncodingFailure { cause } => EngineError::EncodingFailure {
            cause: scrub(cause),
        },
        EngineError::Io(e) => EngineError::Io(std::io::Error::new(e.kind(), scrub(e.to_string()))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_people() -> TableStore {
        let store = TableStore::open_in_memory().unwrap();
        store
            .create_table(
                "people",
                &[
                    ("id".into(), "INTEGER".into()),
                    ("name".into(), "TEXT".into()),
                ],
            )
            .unwrap();
        let rows = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::Text("Alice".into())],
                vec![Value::Integer(2), Value::Text("Bob".into())],
            ],
        )
        .unwrap();
        assert_eq!(store.insert_rows("people", &rows).unwrap(), 2);
        store
    }

    #[test]
    fn test_create_list_schema_drop() {
        let store = store_with_people();
        assert_eq!(store.list_tables().unwrap(), vec!["people"]);

        let schema = store.get_schema("people").unwrap();
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(schema.columns[0].data_type, "INTEGER");
        assert!(schema.columns[1].nullable);
        assert_eq!(store.row_count("people").unwrap(), 2);

        store.drop_table("people").unwrap();
        store.drop_table("people").unwrap();
        assert!(store.list_tables().unwrap().is_empty());
        assert!(matches!(
            store.get_schema("people"),
            Err(EngineError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_create_rejects_bad_definitions() {
        let store = store_with_people();
        assert!(matches!(
            store.create_table("people", &[("x".into(), "INTEGER".into())]),
            Err(EngineError::TableAlreadyExists(_))
        ));
        assert!(matches!(
            store.create_table("x; DROP TABLE people", &[("x".into(), "INTEGER".into())]),
            Err(EngineError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            store.create_table("empty", &[]),
            Err(EngineError::InvalidSchema(_))
        ));
        assert!(matches!(
            store.create_table("dup", &[("a".into(), "INTEGER".into()), ("A".into(), "TEXT".into())]),
            Err(EngineError::InvalidSchema(_))
        ));
        assert!(matches!(
            store.create_table("widgets", &[("w".into(), "WIDGET".into())]),
            Err(EngineError::InvalidSchema(_))
        ));
        assert_eq!(store.list_tables().unwrap(), vec!["people"]);
    }

    #[test]
    fn test_execute_with_named_params() {
        let store = store_with_people();
        let mut params = NamedParams::new();
        params.insert("min_id".into(), Value::Integer(2));
        let rows = store
            .execute_sql("SELECT name FROM people WHERE id >= $min_id", &params)
            .unwrap();
        assert_eq!(rows.columns(), &["name"]);
        assert_eq!(rows.rows(), &[vec![Value::Text("Bob".into())]]);
    }

    #[test]
    fn test_bound_values_are_not_sql() {
        let store = store_with_people();
        let mut params = NamedParams::new();
        params.insert("name".into(), Value::Text("x'; DROP TABLE people; --".into()));
        let rows = store
            .execute_sql("SELECT id FROM people WHERE name = $name", &params)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.list_tables().unwrap(), vec!["people"]);
    }

    #[test]
    fn test_query_errors_are_classified() {
        let store = store_with_people();
        let none = NamedParams::new();
        assert!(matches!(
            store.execute_sql("SELECT * FROM missing", &none),
            Err(EngineError::TableNotFound(_))
        ));
        assert!(matches!(
            store.execute_sql("SELECT nope FROM people", &none),
            Err(EngineError::UnknownColumn(_))
        ));
        assert!(matches!(
            store.execute_sql("SELEC 1", &none),
            Err(EngineError::QueryError { .. })
        ));
    }

    #[test]
    fn test_insert_coerces_and_validates() {
        let store = store_with_people();
        let loose = ResultSet::new(
            vec!["name".into(), "id".into()],
            vec![vec![Value::Text("Cara".into()), Value::Text("3".into())]],
        )
        .unwrap();
        store.insert_rows("people", &loose).unwrap();
        let rows = store
            .execute_sql("SELECT id FROM people WHERE name = 'Cara'", &NamedParams::new())
            .unwrap();
        assert_eq!(rows.rows(), &[vec![Value::Integer(3)]]);

        let unknown = ResultSet::new(vec!["age".into()], vec![vec![Value::Integer(1)]]).unwrap();
        assert!(matches!(
            store.insert_rows("people", &unknown),
            Err(EngineError::SchemaMismatch(_))
        ));
        assert!(matches!(
            store.insert_rows("ghosts", &unknown),
            Err(EngineError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let store = store_with_people();
        let batch = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(10), Value::Text("ok".into())],
                vec![Value::Text("ten".into()), Value::Text("bad".into())],
            ],
        )
        .unwrap();
        assert!(matches!(
            store.insert_rows("people", &batch),
            Err(EngineError::SchemaMismatch(_))
        ));
        assert_eq!(store.row_count("people").unwrap(), 2);
    }

    #[test]
    fn test_required_columns() {
        let store = TableStore::open_in_memory().unwrap();
        store
            .execute_sql(
                "CREATE TABLE strict (id INTEGER NOT NULL, note TEXT, n INTEGER NOT NULL DEFAULT 0)",
                &NamedParams::new(),
            )
            .unwrap();
        let missing = ResultSet::new(vec!["note".into()], vec![vec![Value::Text("x".into())]]).unwrap();
        let err = store.insert_rows("strict", &missing).unwrap_err();
        assert!(err.to_string().contains("'id'"));

        let null_id = ResultSet::new(vec!["id".into()], vec![vec![Value::Null]]).unwrap();
        assert!(matches!(
            store.insert_rows("strict", &null_id),
            Err(EngineError::SchemaMismatch(_))
        ));

        let ok = ResultSet::new(vec!["id".into()], vec![vec![Value::Integer(1)]]).unwrap();
        assert_eq!(store.insert_rows("strict", &ok).unwrap(), 1);
    }

    #[test]
    fn test_builder_plan_runs() {
        let store = TableStore::open_in_memory().unwrap();
        store
            .execute_sql(
                "CREATE TABLE sales AS SELECT * FROM (VALUES \
                 ('east', 'q1', 10), ('east', 'q2', 20), ('west', 'q1', 5)) v(region, quarter, amount)",
                &NamedParams::new(),
            )
            .unwrap();
        let spec = QuerySpec::builder()
            .pivot_index(["region"])
            .pivot_column("quarter")
            .pivot_values("amount")
            .order_by(["region"])
            .build()
            .unwrap();
        let source = QuerySource::Table(Identifier::parse("sales").unwrap());
        let rows = store.query(&source, &spec, &NamedParams::new()).unwrap();
        assert_eq!(rows.columns(), &["region", "q1", "q2"]);
        assert_eq!(rows.get(0, "q2"), Some(&Value::Integer(20)));
        assert_eq!(rows.get(1, "q2"), Some(&Value::Null));

        let empty = QuerySpec::builder()
            .filter("amount > 100")
            .pivot_index(["region"])
            .pivot_column("quarter")
            .pivot_values("amount")
            .build()
            .unwrap();
        let rows = store.query(&source, &empty, &NamedParams::new()).unwrap();
        assert_eq!(rows.columns(), &["region"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_query_over_parameterised_subquery() {
        let store = store_with_people();
        let mut params = NamedParams::new();
        params.insert("min".into(), Value::Integer(1));
        let spec = QuerySpec::builder()
            .select(["name"])
            .order_by(["name"])
            .ascending(false)
            .limit(1)
            .build()
            .unwrap();
        let source = QuerySource::Subquery("SELECT * FROM people WHERE id >= $min;".into());
        let rows = store.query(&source, &spec, &params).unwrap();
        assert_eq!(rows.rows(), &[vec![Value::Text("Bob".into())]]);
    }

    #[test]
    fn test_native_export_and_import() {
        let store = store_with_people();
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("people.csv");
        store
            .write_query("SELECT * FROM people ORDER BY id", &NamedParams::new(), &csv, DataFormat::Csv)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&csv).unwrap(), "id,name\n1,Alice\n2,Bob\n");

        let back = store.read_file(&csv, DataFormat::Csv).unwrap();
        assert_eq!(back.columns(), &["id", "name"]);
        assert_eq!(back.len(), 2);

        assert_eq!(store.import_file("copy", &csv, DataFormat::Csv).unwrap(), 2);
        assert!(matches!(
            store.import_file("copy", &csv, DataFormat::Csv),
            Err(EngineError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_file_errors_hide_paths() {
        let store = TableStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere.csv");
        let err = store.read_file(&missing, DataFormat::Csv).unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains(dir.path().to_string_lossy().as_ref()), "{msg}");
        assert!(msg.contains("<file>"), "{msg}");
    }

    #[test]
    fn test_listed_views_can_be_dropped() {
        let store = store_with_people();
        store
            .execute_sql(
                "CREATE VIEW first_person AS SELECT * FROM people WHERE id = 1",
                &NamedParams::new(),
            )
            .unwrap();
        assert_eq!(store.list_tables().unwrap(), vec!["first_person", "people"]);

        store.drop_table("first_person").unwrap();
        store.drop_table("first_person").unwrap();
        assert_eq!(store.list_tables().unwrap(), vec!["people"]);
        assert_eq!(store.row_count("people").unwrap(), 2);
    }

    #[test]
    fn test_export_query_pivots_under_one_lock() {
        let store = TableStore::open_in_memory().unwrap();
        store
            .execute_sql(
                "CREATE TABLE sales AS SELECT * FROM (VALUES \
                 ('east', 'q1', 10), ('east', 'q2', 20), ('west', 'q1', 5)) v(region, quarter, amount)",
                &NamedParams::new(),
            )
            .unwrap();
        let spec = QuerySpec::builder()
            .pivot_index(["region"])
            .pivot_column("quarter")
            .pivot_values("amount")
            .order_by(["region"])
            .build()
            .unwrap();
        let source = QuerySource::Table(Identifier::parse("sales").unwrap());
        let dir = tempfile::tempdir().unwrap();

        let csv = dir.path().join("pivot.csv");
        store
            .export_query(&source, &spec, &NamedParams::new(), &csv, DataFormat::Csv)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&csv).unwrap(),
            "region,q1,q2\neast,10,20\nwest,5,\n"
        );

        let json = dir.path().join("pivot.json");
        store
            .export_query(&source, &spec, &NamedParams::new(), &json, DataFormat::Json)
            .unwrap();
        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(body["columns"], serde_json::json!(["region", "q1", "q2"]));
        assert_eq!(body["data"][1]["q2"], serde_json::Value::Null);
    }

    #[test]
    fn test_closed_store_is_unavailable() {
        let store = store_with_people();
        store.close();
        assert!(!store.is_open());
        assert!(matches!(store.list_tables(), Err(EngineError::StoreUnavailable)));
        assert!(matches!(store.drop_table("people"), Err(EngineError::StoreUnavailable)));
    }
}
