//! Atomic publication of finished outputs.
//!
//! Output is written to `<final>.tmp` next to the final path. Publishing
//! is a single `rename` onto the final path, so a reader of the final path
//! sees either the previous file or the complete new one, never a partial
//! write. Unpublished temp files are removed.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ExtractError, Result};

const TEMP_SUFFIX: &str = ".tmp";

/// An output written to its temporary path, waiting to be published.
#[derive(Debug)]
pub struct StagedOutput {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedOutput {
    pub fn new(final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        Self {
            temp_path: temp_path_for(&final_path),
            final_path,
        }
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Create (or truncate) the temporary file.
    pub fn create_file(&self) -> Result<File> {
        Ok(File::create(&self.temp_path)?)
    }

    /// Rename the temporary file over the final path.
    ///
    /// On failure the final path is untouched and the temporary file is
    /// removed.
    pub fn commit(self) -> Result<PathBuf> {
        if let Err(e) = fs::rename(&self.temp_path, &self.final_path) {
            let err = ExtractError::Publish {
                path: self.final_path.display().to_string(),
                message: e.to_string(),
            };
            if let Err(cleanup) = self.discard() {
                warn!(error = %cleanup, "failed to remove unpublished output");
            }
            return Err(err);
        }
        sync_parent_dir(&self.final_path);
        debug!(path = %self.final_path.display(), "published output");
        Ok(self.final_path)
    }

    /// Remove the temporary file. A missing file is not an error.
    pub fn discard(&self) -> Result<()> {
        match fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `dir/name.csv.gz` -> `dir/name.csv.gz.tmp`
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

/// Persist the rename itself. Best effort; not every platform supports
/// syncing a directory handle.
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!(dir = %parent.display(), error = %e, "directory sync skipped");
    }
}
