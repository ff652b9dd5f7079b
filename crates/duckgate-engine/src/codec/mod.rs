//! Conversion between [`ResultSet`] and the four wire formats.
//!
//! | Format | Media type | Export |
//! |---|---|---|
//! | `json` | `application/json` | always inline |
//! | `ndjson` | `application/x-ndjson` | inline up to the threshold, then spooled |
//! | `csv` | `text/csv` | always spooled |
//! | `parquet` | `application/octet-stream` | always spooled |
//!
//! Spooled artifacts own a [`TempPath`]; the file is removed when the
//! artifact, or whatever took ownership of the path, is dropped.

mod columnar;
mod csv;
mod json;
mod parquet_io;
mod spool;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::Bytes;
use tempfile::TempPath;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::value::ResultSet;

use spool::{Finished, Spool};

/// Inline threshold applied when none is configured.
pub const DEFAULT_INLINE_THRESHOLD: usize = 1024 * 1024;

/// A supported wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    Json,
    Ndjson,
    Csv,
    Parquet,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Ndjson => "ndjson",
            DataFormat::Csv => "csv",
            DataFormat::Parquet => "parquet",
        }
    }

    /// Media type of an encoded response body.
    pub fn media_type(&self) -> &'static str {
        match self {
            DataFormat::Json => "application/json",
            DataFormat::Ndjson => "application/x-ndjson",
            DataFormat::Csv => "text/csv",
            DataFormat::Parquet => "application/octet-stream",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Suggested download name for an exported result.
    pub fn filename(&self) -> String {
        format!("result.{}", self.extension())
    }

    /// Format of an upload, from its `Content-Type` header value.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn from_media_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Some(DataFormat::Json),
            "application/x-ndjson" | "application/ndjson" | "application/jsonl" => {
                Some(DataFormat::Ndjson)
            }
            "text/csv" => Some(DataFormat::Csv),
            "application/parquet" | "application/vnd.apache.parquet" => Some(DataFormat::Parquet),
            _ => None,
        }
    }

    /// Format of an uploaded file, from its name.
    pub fn from_extension(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        ext.parse()
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(DataFormat::Json),
            "ndjson" | "jsonl" => Ok(DataFormat::Ndjson),
            "csv" => Ok(DataFormat::Csv),
            "parquet" => Ok(DataFormat::Parquet),
            other => Err(EngineError::UnsupportedFormat(format!(
                "'{}' (expected one of json, ndjson, csv, parquet)",
                other
            ))),
        }
    }
}

/// Where and when exports spill to disk.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory for temporary export files.
    pub spool_dir: PathBuf,
    /// Largest ndjson body kept in memory.
    pub inline_threshold: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            spool_dir: std::env::temp_dir(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl ExportOptions {
    /// A fresh, empty temporary file in the spool directory.
    pub fn temp_file(&self, format: DataFormat) -> Result<tempfile::NamedTempFile> {
        Ok(spool::new_temp_file(&self.spool_dir, format)?)
    }
}

/// An encoded result ready to be sent.
#[derive(Debug)]
pub enum ExportArtifact {
    Inline {
        body: Bytes,
        media_type: &'static str,
        filename: String,
    },
    /// Encoded into a temporary file that is deleted on drop.
    Spooled {
        file: TempPath,
        media_type: &'static str,
        filename: String,
    },
}

impl ExportArtifact {
    pub fn media_type(&self) -> &'static str {
        match self {
            ExportArtifact::Inline { media_type, .. } | ExportArtifact::Spooled { media_type, .. } => {
                media_type
            }
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ExportArtifact::Inline { filename, .. } | ExportArtifact::Spooled { filename, .. } => {
                filename
            }
        }
    }

    /// Wrap a file already written by the store's own exporter.
    pub fn spooled(file: TempPath, format: DataFormat) -> Self {
        ExportArtifact::Spooled {
            file,
            media_type: format.media_type(),
            filename: format.filename(),
        }
    }
}

/// Encode `result` into `writer` in the given format.
pub fn encode<W: Write + Send>(result: &ResultSet, format: DataFormat, writer: W) -> Result<()> {
    match format {
        DataFormat::Json => json::write_document(result, writer),
        DataFormat::Ndjson => json::write_lines(result, writer),
        DataFormat::Csv => csv::write(result, writer),
        DataFormat::Parquet => parquet_io::write(result, writer),
    }
}

/// Encode `result` for a response, spooling to disk where the format requires it.
pub fn export(result: &ResultSet, format: DataFormat, options: &ExportOptions) -> Result<ExportArtifact> {
    let media_type = format.media_type();
    let filename = format.filename();

    let mut spool = match format {
        DataFormat::Json => Spool::in_memory(),
        DataFormat::Ndjson => Spool::with_threshold(options, format, options.inline_threshold),
        DataFormat::Csv | DataFormat::Parquet => Spool::file_backed(options, format)?,
    };
    encode(result, format, &mut spool)?;

    let artifact = match spool.finish()? {
        Finished::Memory(body) => ExportArtifact::Inline {
            body: Bytes::from(body),
            media_type,
            filename,
        },
        Finished::File(file) => ExportArtifact::Spooled {
            file,
            media_type,
            filename,
        },
    };
    debug!(
        format = %format,
        rows = result.len(),
        spooled = matches!(artifact, ExportArtifact::Spooled { .. }),
        "Encoded export"
    );
    Ok(artifact)
}

/// Decode an uploaded payload.
pub fn decode(payload: Bytes, format: DataFormat) -> Result<ResultSet> {
    match format {
        DataFormat::Json => json::read_document(&payload),
        DataFormat::Ndjson => json::read_lines(&payload),
        DataFormat::Csv => csv::read(payload),
        DataFormat::Parquet => parquet_io::read(payload),
    }
}

/// Decode an upload bound for a table with declared column types.
///
/// CSV cells stay text so the store converts them against the declared type
/// instead of a guessed one. JSON and Parquet carry their own types and
/// decode as with [`decode`].
pub fn decode_verbatim(payload: Bytes, format: DataFormat) -> Result<ResultSet> {
    match format {
        DataFormat::Csv => csv::read_text(payload),
        other => decode(payload, other),
    }
}
