//! Write target that starts in memory and spills to a temporary file.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use super::{DataFormat, ExportOptions};

pub(crate) fn new_temp_file(dir: &Path, format: DataFormat) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("duckgate-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(dir)
}

enum State {
    Memory(Vec<u8>),
    File(BufWriter<NamedTempFile>),
}

/// Encoder output that moves to disk once it outgrows its threshold.
pub(crate) struct Spool {
    state: State,
    /// `None` keeps everything in memory.
    threshold: Option<usize>,
    dir: PathBuf,
    format: DataFormat,
}

/// Where the encoded bytes ended up.
pub(crate) enum Finished {
    Memory(Vec<u8>),
    File(TempPath),
}

impl Spool {
    pub(crate) fn in_memory() -> Self {
        Self {
            state: State::Memory(Vec::new()),
            threshold: None,
            dir: PathBuf::new(),
            format: DataFormat::Json,
        }
    }

    pub(crate) fn with_threshold(options: &ExportOptions, format: DataFormat, threshold: usize) -> Self {
        Self {
            state: State::Memory(Vec::new()),
            threshold: Some(threshold),
            dir: options.spool_dir.clone(),
            format,
        }
    }

    /// A spool that writes straight to a temporary file.
    pub(crate) fn file_backed(options: &ExportOptions, format: DataFormat) -> io::Result<Self> {
        let file = new_temp_file(&options.spool_dir, format)?;
        Ok(Self {
            state: State::File(BufWriter::new(file)),
            threshold: None,
            dir: options.spool_dir.clone(),
            format,
        })
    }

    fn spill(&mut self) -> io::Result<()> {
        if let State::Memory(buf) = &mut self.state {
            let mut file = BufWriter::new(new_temp_file(&self.dir, self.format)?);
            file.write_all(buf)?;
            debug!(bytes = buf.len(), path = %self.dir.display(), "Spilled export to disk");
            self.state = State::File(file);
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> io::Result<Finished> {
        match self.state {
            State::Memory(buf) => Ok(Finished::Memory(buf)),
            State::File(writer) => {
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.as_file().sync_all()?;
                Ok(Finished::File(file.into_temp_path()))
            }
        }
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Memory(buf) => {
                buf.extend_from_slice(data);
                if self.threshold.is_some_and(|limit| buf.len() > limit) {
                    self.spill()?;
                }
                Ok(data.len())
            }
            State::File(file) => file.write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Memory(_) => Ok(()),
            State::File(file) => file.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stays_in_memory_under_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions {
            spool_dir: dir.path().to_path_buf(),
            inline_threshold: 16,
        };
        let mut spool = Spool::with_threshold(&options, DataFormat::Ndjson, 16);
        spool.write_all(b"0123456789").unwrap();
        match spool.finish().unwrap() {
            Finished::Memory(buf) => assert_eq!(buf, b"0123456789"),
            Finished::File(_) => panic!("should not have spilled"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_spills_and_keeps_earlier_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions {
            spool_dir: dir.path().to_path_buf(),
            inline_threshold: 4,
        };
        let mut spool = Spool::with_threshold(&options, DataFormat::Ndjson, 4);
        spool.write_all(b"abc").unwrap();
        spool.write_all(b"defg").unwrap();
        spool.write_all(b"hij").unwrap();
        match spool.finish().unwrap() {
            Finished::File(path) => {
                assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghij");
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                assert!(name.starts_with("duckgate-") && name.ends_with(".ndjson"));
            }
            Finished::Memory(_) => panic!("should have spilled"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
