//! JSON document and newline-delimited JSON.

use std::collections::HashMap;
use std::io::Write;

use serde_json::{Map, Value as JsonValue};

use crate::error::{EngineError, Result};
use crate::value::{ResultSet, Value};

pub(super) fn write_document<W: Write>(result: &ResultSet, mut writer: W) -> Result<()> {
    serde_json::to_writer(&mut writer, result)?;
    writer.flush()?;
    Ok(())
}

pub(super) fn write_lines<W: Write>(result: &ResultSet, mut writer: W) -> Result<()> {
    for record in result.records() {
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Accepts `{"columns": [...], "data": [...]}`, an array of objects, or one object.
pub(super) fn read_document(payload: &[u8]) -> Result<ResultSet> {
    let doc: JsonValue = serde_json::from_slice(payload)?;
    let mut acc = RecordAccumulator::default();

    match doc {
        JsonValue::Object(mut obj) if obj.get("data").is_some_and(JsonValue::is_array) => {
            if let Some(JsonValue::Array(columns)) = obj.remove("columns") {
                for column in columns {
                    match column {
                        JsonValue::String(name) => acc.column(&name),
                        other => {
                            return Err(EngineError::encoding(format!(
                                "column names must be strings, got {}",
                                other
                            )))
                        }
                    };
                }
            }
            if let Some(JsonValue::Array(rows)) = obj.remove("data") {
                for (i, row) in rows.into_iter().enumerate() {
                    acc.push(row, i)?;
                }
            }
        }
        JsonValue::Array(rows) => {
            for (i, row) in rows.into_iter().enumerate() {
                acc.push(row, i)?;
            }
        }
        obj @ JsonValue::Object(_) => acc.push(obj, 0)?,
        other => {
            return Err(EngineError::encoding(format!(
                "expected an object or an array of objects, got {}",
                kind(&other)
            )))
        }
    }
    acc.finish()
}

pub(super) fn read_lines(payload: &[u8]) -> Result<ResultSet> {
    let mut acc = RecordAccumulator::default();
    let lines = payload
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| line.iter().any(|b| !b.is_ascii_whitespace()));
    for (i, line) in lines.enumerate() {
        let row: JsonValue = serde_json::from_slice(line)
            .map_err(|e| EngineError::encoding(format!("line {}: {}", i + 1, e)))?;
        acc.push(row, i)?;
    }
    acc.finish()
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Collects JSON objects into rows, adding columns in first-seen order and
/// filling absent keys with null.
#[derive(Default)]
struct RecordAccumulator {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl RecordAccumulator {
    fn column(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.positions.get(name) {
            return idx;
        }
        let idx = self.columns.len();
        self.columns.push(name.to_string());
        self.positions.insert(name.to_string(), idx);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        idx
    }

    fn push(&mut self, row: JsonValue, index: usize) -> Result<()> {
        let object: Map<String, JsonValue> = match row {
            JsonValue::Object(object) => object,
            other => {
                return Err(EngineError::encoding(format!(
                    "row {} is {}, expected an object",
                    index + 1,
                    kind(&other)
                )))
            }
        };
        let mut values = vec![Value::Null; self.columns.len()];
        for (key, value) in &object {
            let idx = self.column(key);
            if idx >= values.len() {
                values.resize(idx + 1, Value::Null);
            }
            values[idx] = Value::from_json(value);
        }
        self.rows.push(values);
        Ok(())
    }

    fn finish(mut self) -> Result<ResultSet> {
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, Value::Null);
        }
        ResultSet::new(self.columns, self.rows)
    }
}
