//! Configuration and statistics for the external sort.

use std::path::PathBuf;

use crate::error::{ExtractError, Result};

const MB: usize = 1024 * 1024;

/// Sizing of one sorted sink.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Spill the in-memory partition once it holds this many bytes.
    pub buffer_byte_limit: usize,
    /// Spill the in-memory partition once it holds this many records.
    pub buffer_record_limit: usize,
    /// Capacity of the queue between the scanner and the sort stage.
    /// A full queue blocks the scanner.
    pub queue_capacity: usize,
    /// Capacity of the queue between the sort stage and the writer stage.
    pub output_queue_capacity: usize,
    /// Maximum number of run-files read by a single merge pass.
    pub merge_fan_in: usize,
    /// Directory for run-files. Defaults to the output directory.
    pub spill_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            buffer_byte_limit: 64 * MB,
            buffer_record_limit: 1_000_000,
            queue_capacity: 50_000,
            output_queue_capacity: 10_000,
            merge_fan_in: 64,
            spill_dir: None,
        }
    }
}

impl SortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_byte_limit == 0 || self.buffer_record_limit == 0 {
            return Err(ExtractError::Config("sort buffer limits must be positive".to_string()));
        }
        if self.queue_capacity == 0 || self.output_queue_capacity == 0 {
            return Err(ExtractError::Config("queue capacities must be positive".to_string()));
        }
        if self.merge_fan_in < 2 {
            return Err(ExtractError::Config(format!(
                "merge fan-in must be at least 2, got {}",
                self.merge_fan_in
            )));
        }
        Ok(())
    }
}

/// Counters reported by a finished sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Records pushed into the sorter.
    pub records_in: u64,
    /// Records emitted by the final merge.
    pub records_out: u64,
    /// In-memory partitions written to run-files.
    pub spills: u64,
    /// Bytes written to run-files, including intermediate merge passes.
    pub bytes_spilled: u64,
    /// Intermediate merges needed to bring the run count under the fan-in.
    pub intermediate_merges: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_config_default() {
        let config = SortConfig::default();
        assert_eq!(config.queue_capacity, 50_000);
        assert_eq!(config.merge_fan_in, 64);
        assert!(config.spill_dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_sort_config_rejects_small_fan_in() {
        let config = SortConfig {
            merge_fan_in: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sort_config_rejects_zero_capacity() {
        let config = SortConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
