//! CSV through Arrow's reader and writer.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;

use super::columnar;
use crate::error::Result;
use crate::value::ResultSet;

/// Rows sampled for type inference.
const INFER_MAX_RECORDS: usize = 1_000;

/// Header first, minimal quoting, empty field for null, `\n` line ends.
pub(super) fn write<W: Write>(result: &ResultSet, mut writer: W) -> Result<()> {
    if result.columns().is_empty() {
        return Ok(());
    }
    let batch = columnar::text_batch(result)?;
    {
        let mut csv = WriterBuilder::new().with_header(true).build(&mut writer);
        csv.write(&batch)?;
    }
    writer.flush()?;
    Ok(())
}

/// Decode with column types inferred from the first rows.
pub(super) fn read(payload: Bytes) -> Result<ResultSet> {
    read_with(payload, |schema| schema)
}

/// Decode with every column as text, leaving conversion to whoever knows the
/// declared types. `02134` stays `02134`.
pub(super) fn read_text(payload: Bytes) -> Result<ResultSet> {
    read_with(payload, |schema| {
        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect();
        Schema::new(fields)
    })
}

fn read_with(payload: Bytes, shape: impl FnOnce(Schema) -> Schema) -> Result<ResultSet> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(ResultSet::default());
    }

    let format = Format::default().with_header(true);
    let mut cursor = Cursor::new(payload);
    let (schema, _) = format.infer_schema(&mut cursor, Some(INFER_MAX_RECORDS))?;
    cursor.seek(SeekFrom::Start(0))?;
    let schema = shape(schema);

    let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .build(cursor)?;
    columnar::collect_batches(columns, reader)
}
