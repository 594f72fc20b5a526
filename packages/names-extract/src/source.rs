//! Sequential entity stream over a Wikidata JSON dump.
//!
//! Dump layout:
//! ```text
//! [
//! {"type":"item","id":"Q1",...},
//! {"type":"item","id":"Q2",...}
//! ]
//! ```
//! One entity per line, each followed by a comma except the last. The
//! pipeline only needs an `Iterator<Item = Result<Entity>>`; this module
//! provides one over any `BufRead`, plus a helper that opens compressed
//! dump files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use tracing::warn;

use crate::entity::Entity;
use crate::error::{ExtractError, Result};

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Reads entities line by line. Stops after the first error.
pub struct JsonDumpReader<R> {
    reader: R,
    line: String,
    line_number: u64,
    failed: bool,
}

impl<R: BufRead> JsonDumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            failed: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<Entity>> {
        self.failed = true;
        Some(Err(ExtractError::Source(message)))
    }
}

impl<R: BufRead> Iterator for JsonDumpReader<R> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => self.line_number += 1,
                Err(e) => {
                    let message = format!("read failed after line {}: {}", self.line_number, e);
                    return self.fail(message);
                }
            }

            let trimmed = self.line.trim();
            let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed);
            if trimmed.is_empty() || trimmed == "[" || trimmed == "]" {
                continue;
            }

            return match Entity::from_json(trimmed) {
                Ok(entity) => Some(Ok(entity)),
                Err(e) => {
                    let message = format!("line {}: {}", self.line_number, e);
                    self.fail(message)
                }
            };
        }
    }
}

/// Open a dump file, decompressing `.bz2` and `.gz` transparently.
pub fn open_dump(path: &Path) -> Result<JsonDumpReader<Box<dyn BufRead + Send>>> {
    let file = File::open(path)
        .map_err(|e| ExtractError::Source(format!("cannot open {}: {}", path.display(), e)))?;

    let reader: Box<dyn BufRead + Send> = match path.extension().and_then(|e| e.to_str()) {
        Some("bz2") => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiBzDecoder::new(BufReader::new(file)),
        )),
        Some("gz") => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiGzDecoder::new(BufReader::new(file)),
        )),
        Some("json") | Some("jsonl") | Some("ndjson") => {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        }
        other => {
            warn!(path = %path.display(), extension = ?other, "unknown dump extension, reading as plain JSON");
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        }
    };
    Ok(JsonDumpReader::new(reader))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    const DUMP: &str = "[\n\
        {\"id\":\"Q1\",\"labels\":{\"en\":{\"language\":\"en\",\"value\":\"Anna\"}}},\n\
        \n\
        {\"id\":\"Q2\",\"labels\":{}},\n\
        {\"id\":\"Q3\"}\n\
        ]\n";

    #[test]
    fn test_reads_all_entities() {
        let ids: Vec<String> = JsonDumpReader::new(Cursor::new(DUMP))
            .map(|e| e.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["Q1", "Q2", "Q3"]);
    }

    #[test]
    fn test_parse_error_reports_line_and_stops() {
        let dump = "[\n{\"id\":\"Q1\"},\n{broken\n{\"id\":\"Q3\"}\n]\n";
        let mut reader = JsonDumpReader::new(Cursor::new(dump));
        assert_eq!(reader.next().unwrap().unwrap().id, "Q1");

        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.code(), "SOURCE_ERROR");
        assert!(err.to_string().contains("line 3"), "{}", err);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_dump() {
        assert_eq!(JsonDumpReader::new(Cursor::new("[\n]\n")).count(), 0);
        assert_eq!(JsonDumpReader::new(Cursor::new("")).count(), 0);
    }

    #[test]
    fn test_open_gzip_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(DUMP.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let reader = open_dump(&path).unwrap();
        assert_eq!(reader.map(|e| e.unwrap()).count(), 3);
    }

    #[test]
    fn test_open_missing_dump_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_dump(&dir.path().join("missing.json.bz2")).err().unwrap();
        assert_eq!(err.code(), "SOURCE_ERROR");
    }
}
