//! Dump snapshot discovery and run gating.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::Category;
use crate::error::{ExtractError, Result};

/// Locate the latest entities dump and its snapshot date.
///
/// Resolves `<dumps>/wikidatawiki/entities/latest-all.json.bz2` through
/// symlinks; the snapshot date is the name of the directory holding the
/// resolved file. The resolved path is returned (not the symlink), since
/// the symlink may be switched to a newer dump while we are reading.
pub fn find_entities_dump(dumps_dir: &Path) -> Result<(NaiveDate, PathBuf)> {
    let link = dumps_dir
        .join("wikidatawiki")
        .join("entities")
        .join("latest-all.json.bz2");
    let resolved = fs::canonicalize(&link)
        .map_err(|e| ExtractError::InvalidDump(format!("{}: {}", link.display(), e)))?;

    let dir_name = resolved
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExtractError::InvalidDump(format!("{}: no snapshot directory", resolved.display())))?;
    let date = NaiveDate::parse_from_str(dir_name, "%Y%m%d").map_err(|e| {
        ExtractError::InvalidDump(format!("{}: bad snapshot date '{}': {}", resolved.display(), dir_name, e))
    })?;

    Ok((date, resolved))
}

/// `<category>-<YYYYMMDD>.csv.gz`
pub fn output_file_name(category: &str, date: NaiveDate) -> String {
    format!("{}-{}.csv.gz", category, date.format("%Y%m%d"))
}

/// True if any category's output for `date` is missing from `workdir`.
pub fn should_run(date: NaiveDate, workdir: &Path, categories: &[Category]) -> Result<bool> {
    for category in categories {
        let path = workdir.join(output_file_name(&category.name, date));
        match fs::metadata(&path) {
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(false)
}
