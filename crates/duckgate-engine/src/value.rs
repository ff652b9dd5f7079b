//! Tagged scalar values and row-oriented result sets.
//!
//! [`Value`] is the single representation of a cell everywhere in the engine:
//! values read from DuckDB, values decoded from uploaded files and values
//! parsed from loosely typed JSON request bodies all land here first, and are
//! coerced against a column's declared type before they reach the store.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, ValueRef};
use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::error::{EngineError, Result};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A dynamically typed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Map a JSON value from a request body onto a tagged value.
    ///
    /// Nested arrays and objects are kept as their JSON text so the store can
    /// cast them into `LIST`/`STRUCT`/`JSON` columns itself.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Render the value as text, the way CSV fields carry it.
    ///
    /// Floats keep a fractional part (`1.0`, not `1`) so that a round trip
    /// through CSV does not silently turn them into integers. Blobs are base64.
    pub fn render_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(format!("{:?}", f)),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(BASE64.encode(b)),
        }
    }

    /// Convert into a DuckDB value for bound-parameter substitution.
    pub fn to_duckdb(&self) -> duckdb::types::Value {
        use duckdb::types::Value as Db;
        match self {
            Value::Null => Db::Null,
            Value::Boolean(b) => Db::Boolean(*b),
            Value::Integer(i) => Db::BigInt(*i),
            Value::Float(f) => Db::Double(*f),
            Value::Text(s) => Db::Text(s.clone()),
            Value::Blob(b) => Db::Blob(b.clone()),
        }
    }

    /// Convert a DuckDB cell into a tagged value.
    ///
    /// Temporal types become ISO-8601 text; types with no scalar counterpart
    /// (intervals, lists, structs, ...) fall back to their debug rendering.
    pub fn from_duckdb(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Boolean(b),
            ValueRef::TinyInt(i) => Value::Integer(i.into()),
            ValueRef::SmallInt(i) => Value::Integer(i.into()),
            ValueRef::Int(i) => Value::Integer(i.into()),
            ValueRef::BigInt(i) => Value::Integer(i),
            ValueRef::HugeInt(i) => match i64::try_from(i) {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::UTinyInt(i) => Value::Integer(i.into()),
            ValueRef::USmallInt(i) => Value::Integer(i.into()),
            ValueRef::UInt(i) => Value::Integer(i.into()),
            ValueRef::UBigInt(i) => match i64::try_from(i) {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::Float(f) => Value::Float(f as f64),
            ValueRef::Double(f) => Value::Float(f),
            ValueRef::Decimal(d) => {
                let text = d.to_string();
                text.parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::Text(text))
            }
            ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
            ValueRef::Timestamp(unit, raw) => DateTime::from_timestamp_micros(to_micros(unit, raw))
                .map(|dt| Value::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Integer(raw)),
            ValueRef::Date32(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Integer(days.into())),
            ValueRef::Time64(unit, raw) => {
                let micros = to_micros(unit, raw);
                let secs = micros.div_euclid(1_000_000);
                let nanos = micros.rem_euclid(1_000_000) * 1_000;
                u32::try_from(secs)
                    .ok()
                    .zip(u32::try_from(nanos).ok())
                    .and_then(|(s, n)| NaiveTime::from_num_seconds_from_midnight_opt(s, n))
                    .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
                    .unwrap_or(Value::Integer(raw))
            }
            other => Value::Text(format!("{:?}", other)),
        }
    }

    /// Coerce the value to fit a column of the given declared SQL type.
    ///
    /// Lossless conversions are applied (`"42"` into an `INTEGER` column,
    /// `7` into a `VARCHAR` column, base64 text into a `BLOB` column); values
    /// that cannot be represented are rejected with a reason. Types this
    /// function does not classify are passed through for the store to judge.
    pub fn coerce_to(&self, declared_type: &str) -> std::result::Result<Value, String> {
        let class = TypeClass::of(declared_type);
        match (class, self) {
            (_, Value::Null) | (TypeClass::Other, _) => Ok(self.clone()),

            (TypeClass::Integer, Value::Integer(_)) => Ok(self.clone()),
            (TypeClass::Integer, Value::Float(f)) if f.fract() == 0.0 && f.abs() < 9.0e18 => {
                Ok(Value::Integer(*f as i64))
            }
            (TypeClass::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' is not an integer", s)),

            (TypeClass::Float, Value::Integer(i)) => Ok(Value::Float(*i as f64)),
            (TypeClass::Float, Value::Float(_)) => Ok(self.clone()),
            (TypeClass::Float, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", s)),

            (TypeClass::Boolean, Value::Boolean(_)) => Ok(self.clone()),
            (TypeClass::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
            (TypeClass::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
            (TypeClass::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },

            (TypeClass::Text, Value::Blob(_)) => Err("binary value in a text column".to_string()),
            (TypeClass::Text, other) => Ok(Value::Text(other.render_text().unwrap_or_default())),

            (TypeClass::Blob, Value::Blob(_)) => Ok(self.clone()),
            (TypeClass::Blob, Value::Text(s)) => BASE64
                .decode(s.trim())
                .map(Value::Blob)
                .map_err(|_| "text in a binary column must be base64".to_string()),

            (_, other) => Err(format!("{} value does not fit type {}", other.kind(), declared_type)),
        }
    }

    /// Short name of the value's tag, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Blob(_) => "binary",
        }
    }
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no NaN or infinity.
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_str(&BASE64.encode(b)),
        }
    }
}

/// Coarse classification of a declared SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Float,
    Boolean,
    Text,
    Blob,
    /// Dates, timestamps, nested types, ...: left to the store.
    Other,
}

impl TypeClass {
    /// Classify a DuckDB type name such as `INTEGER`, `DECIMAL(10,2)` or `VARCHAR`.
    pub fn of(declared_type: &str) -> Self {
        let upper = declared_type.trim().to_ascii_uppercase();
        if upper.ends_with(']') {
            return TypeClass::Other;
        }
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" | "UHUGEINT" | "INT1" | "INT2" | "INT4"
            | "INT8" | "LONG" | "SHORT" | "SIGNED" => TypeClass::Integer,
            "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "DECIMAL" | "NUMERIC" => {
                TypeClass::Float
            }
            "BOOLEAN" | "BOOL" | "LOGICAL" => TypeClass::Boolean,
            "VARCHAR" | "TEXT" | "STRING" | "CHAR" | "BPCHAR" | "NVARCHAR" => TypeClass::Text,
            "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => TypeClass::Blob,
            _ => TypeClass::Other,
        }
    }
}

/// An ordered-column, row-oriented query result.
///
/// Rows are stored positionally and aligned with [`columns`](Self::columns);
/// [`record`](Self::record) gives the name-to-value view of a row. Column
/// names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Build a result set, checking that column names are unique and every
    /// row has one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(EngineError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    column
                )));
            }
        }
        let mut result = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            result.push_row(row)?;
        }
        Ok(result)
    }

    /// Build a result set from store output, renaming repeated column names
    /// (`a`, `a` becomes `a`, `a_1`).
    pub(crate) fn with_deduplicated_columns(
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
        let mut unique = Vec::with_capacity(columns.len());
        for column in columns {
            let mut candidate = column.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{}_{}", column, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            unique.push(candidate);
        }
        Self::new(unique, rows)
    }

    /// Append a row; it must have exactly one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::SchemaMismatch(format!(
                "row has {} values but there are {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Name-to-value view of one row, in column order.
    pub fn record(&self, row: usize) -> Option<Record<'_>> {
        self.rows.get(row).map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Iterate over all rows as records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Every value of one column, top to bottom.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[idx])
    }
}

/// One row viewed as a mapping from column name to value.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Records<'a>(&'a ResultSet);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for record in self.0.records() {
            seq.serialize_element(&record)?;
        }
        seq.end()
    }
}

/// Serialises as `{"columns": [...], "data": [{column: value, ...}, ...]}`.
impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResultSet", 2)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("data", &Records(self))?;
        state.end()
    }
}
