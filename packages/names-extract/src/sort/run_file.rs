//! Sorted run-files.
//!
//! A run-file holds one spilled partition as a sequence of bincode-encoded
//! [`NameRecord`]s, already in name order. The record count is kept in
//! memory, so readers stop after exactly that many records.
//!
//! Run-files live in named temp files and are deleted when the
//! [`RunFile`] is dropped, whether the sort succeeded or not.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::name::NameRecord;

const IO_BUFFER_SIZE: usize = 256 * 1024;

/// A finished, immutable run-file.
#[derive(Debug)]
pub struct RunFile {
    file: NamedTempFile,
    records: u64,
    byte_size: u64,
}

impl RunFile {
    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Open an independent reader positioned at the first record.
    pub fn open(&self) -> Result<RunReader> {
        let file = self.file.reopen()?;
        Ok(RunReader {
            reader: BufReader::with_capacity(IO_BUFFER_SIZE, file),
            remaining: self.records,
        })
    }
}

/// Streams records into a new run-file. Records must arrive sorted.
pub struct RunWriter {
    writer: BufWriter<NamedTempFile>,
    records: u64,
}

impl RunWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("names-run-")
            .suffix(".bin")
            .tempfile_in(dir)?;
        Ok(Self {
            writer: BufWriter::with_capacity(IO_BUFFER_SIZE, file),
            records: 0,
        })
    }

    pub fn push(&mut self, record: &NameRecord) -> Result<()> {
        bincode::serialize_into(&mut self.writer, record)?;
        self.records += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<RunFile> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        let byte_size = file.as_file().metadata()?.len();
        Ok(RunFile {
            file,
            records: self.records,
            byte_size,
        })
    }
}

/// Sequential reader over a run-file.
pub struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl Iterator for RunReader {
    type Item = Result<NameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match bincode::deserialize_from(&mut self.reader) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.remaining = 0;
                Some(Err(e.into()))
            }
        }
    }
}
