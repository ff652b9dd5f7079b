//! Parquet through the Arrow writer and record batch reader.

use std::io::Write;

use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::columnar;
use crate::error::{EngineError, Result};
use crate::value::ResultSet;

/// One Snappy-compressed row group holding the whole result.
pub(super) fn write<W: Write + Send>(result: &ResultSet, writer: W) -> Result<()> {
    if result.columns().is_empty() {
        return Err(EngineError::encoding("a parquet file needs at least one column"));
    }
    let batch = columnar::typed_batch(result)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(result.len().max(1))
        .build();

    let mut parquet = ArrowWriter::try_new(writer, batch.schema(), Some(props))?;
    parquet.write(&batch)?;
    parquet.close()?;
    Ok(())
}

pub(super) fn read(payload: Bytes) -> Result<ResultSet> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(payload)?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;
    columnar::collect_batches(columns, reader)
}
