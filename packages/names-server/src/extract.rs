//! Discovery of the newest complete set of extracts.
//!
//! The extractor writes `<category>-<YYYYMMDD>.csv.gz` into its work
//! directory. A date is served only once a file exists for every
//! category, so a run that published only some categories is never
//! visible.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex_lite::Regex;
use tracing::debug;

use crate::error::Result;

/// One downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    pub path: PathBuf,
    /// Base64 of the blake3 hash of the file content, unquoted.
    pub etag: String,
    pub last_modified: SystemTime,
}

/// Download name (`givennames.csv.gz`) to file.
pub type Extracts = HashMap<String, Extract>;

pub const DEFAULT_CATEGORIES: [&str; 2] = ["givennames", "familynames"];

fn file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-zA-Z\d_\-]+)-(\d{8})\.csv\.gz$").expect("extract file pattern is valid")
    })
}

/// Find the newest date on which every category has an extract in `dir`.
///
/// Returns an empty map if no date is complete.
pub fn list_extracts<S: AsRef<str>>(dir: &Path, categories: &[S]) -> Result<Extracts> {
    let mut present = BTreeSet::new();
    let mut dates = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(caps) = file_pattern().captures(name) {
            dates.insert(caps[2].to_string());
            present.insert(name.to_string());
        }
    }

    // YYYYMMDD sorts chronologically as text.
    for date in dates.iter().rev() {
        let complete = categories
            .iter()
            .all(|c| present.contains(&file_name(c.as_ref(), date)));
        if !complete {
            continue;
        }

        let mut extracts = Extracts::with_capacity(categories.len());
        for category in categories {
            let category = category.as_ref();
            let path = dir.join(file_name(category, date));
            let last_modified = fs::metadata(&path)?.modified()?;
            let etag = hash_file(&path)?;
            extracts.insert(
                format!("{}.csv.gz", category),
                Extract {
                    path,
                    etag,
                    last_modified,
                },
            );
        }
        debug!(date = %date, files = extracts.len(), "found complete extract set");
        return Ok(extracts);
    }
    Ok(Extracts::new())
}

fn file_name(category: &str, date: &str) -> String {
    format!("{}-{}.csv.gz", category, date)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(STANDARD.encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_pattern() {
        let caps = file_pattern().captures("given_names-2-20230418.csv.gz").unwrap();
        assert_eq!(&caps[1], "given_names-2");
        assert_eq!(&caps[2], "20230418");

        assert!(file_pattern().captures("givennames-2023041.csv.gz").is_none());
        assert!(file_pattern().captures("givennames-20230418.csv").is_none());
        assert!(file_pattern().captures("givennames-20230418.csv.gz.tmp").is_none());
        assert!(file_pattern().captures("given names-20230418.csv.gz").is_none());
    }

    #[test]
    fn test_hash_file_is_base64_blake3() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();
        let expected = STANDARD.encode(blake3::hash(b"hello").as_bytes());
        assert_eq!(hash_file(&path).unwrap(), expected);
        assert_eq!(expected.len(), 44);
    }

    #[test]
    fn test_missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_extracts(&dir.path().join("nope"), &DEFAULT_CATEGORIES[..]).is_err());
    }
}
