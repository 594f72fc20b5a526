//! Host resource detection and sort sizing.
//!
//! Every category gets its own sorted sink, and all sinks buffer at the
//! same time during a scan. The memory budget for in-memory partitions is
//! therefore split evenly across categories.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::sort::SortConfig;

// ── Constants ───────────────────────────────────────────────────────

const MB: usize = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Rough in-memory footprint of one name record (two short strings).
const BYTES_PER_RECORD: usize = 96;

/// Per-sink sort buffer floor (8 MB).
const SORT_BUFFER_MIN: usize = 8 * MB;

/// Per-sink sort buffer ceiling (256 MB).
const SORT_BUFFER_MAX: usize = 256 * MB;

/// Fraction of available memory shared by all sort buffers.
const SORT_BUFFER_FRACTION: f64 = 0.02;

const QUEUE_CAPACITY: usize = 50_000;
const MERGE_FAN_IN: usize = 64;

// ── SystemResources ─────────────────────────────────────────────────

/// Snapshot of detected hardware resources.
#[derive(Debug, Clone)]
pub struct SystemResources {
    pub total_memory_bytes: u64,
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
    pub cpu_count: usize,
}

impl SystemResources {
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
            cpu_count,
        }
    }
}

// ── TuningProfile ───────────────────────────────────────────────────

/// Sort parameters for one sink, derived from host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningProfile {
    pub sort_buffer_bytes: usize,
    pub sort_buffer_records: usize,
    pub queue_capacity: usize,
    pub merge_fan_in: usize,
}

impl TuningProfile {
    /// Heuristics:
    /// - `sort_buffer_bytes`: `clamp(available * 0.02 / categories, 8 MB, 256 MB)`.
    /// - `sort_buffer_records`: `sort_buffer_bytes / 96`.
    /// - `queue_capacity`: 50 000; `merge_fan_in`: 64.
    pub fn from_resources(res: &SystemResources, categories: usize) -> Self {
        let share = (res.available_memory_bytes as f64 * SORT_BUFFER_FRACTION) as usize;
        let sort_buffer_bytes = (share / categories.max(1)).clamp(SORT_BUFFER_MIN, SORT_BUFFER_MAX);
        Self::with_buffer_bytes(sort_buffer_bytes)
    }

    /// A profile with an explicit per-sink buffer size.
    pub fn with_buffer_bytes(sort_buffer_bytes: usize) -> Self {
        let sort_buffer_bytes = sort_buffer_bytes.max(1);
        Self {
            sort_buffer_bytes,
            sort_buffer_records: (sort_buffer_bytes / BYTES_PER_RECORD).max(1),
            queue_capacity: QUEUE_CAPACITY,
            merge_fan_in: MERGE_FAN_IN,
        }
    }

    pub fn to_sort_config(&self) -> SortConfig {
        SortConfig {
            buffer_byte_limit: self.sort_buffer_bytes,
            buffer_record_limit: self.sort_buffer_records,
            queue_capacity: self.queue_capacity,
            merge_fan_in: self.merge_fan_in,
            ..Default::default()
        }
    }
}

impl Default for TuningProfile {
    /// Used when host memory is not probed.
    fn default() -> Self {
        Self::with_buffer_bytes(64 * MB)
    }
}

// ── ResourceManager ─────────────────────────────────────────────────

pub struct ResourceManager;

impl ResourceManager {
    /// Probe the host and size the sorts of `categories` concurrent sinks.
    pub fn auto_tune(categories: usize) -> TuningProfile {
        let resources = SystemResources::detect();
        let profile = TuningProfile::from_resources(&resources, categories);
        tracing::debug!(
            total_gb = resources.total_memory_bytes as f64 / GB as f64,
            available_gb = resources.available_memory_bytes as f64 / GB as f64,
            cpus = resources.cpu_count,
            sort_buffer_mb = profile.sort_buffer_bytes / MB,
            "sort sizing"
        );
        profile
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build `SystemResources` with explicit values (bypasses detection).
    fn make_resources(total_gb: f64, available_gb: f64) -> SystemResources {
        SystemResources {
            total_memory_bytes: (total_gb * GB as f64) as u64,
            available_memory_bytes: (available_gb * GB as f64) as u64,
            cpu_count: 4,
        }
    }

    #[test]
    fn test_system_resources_detection() {
        let res = SystemResources::detect();
        assert!(res.total_memory_bytes > 0, "total memory must be positive");
        assert!(res.cpu_count >= 1, "cpu count must be at least 1");
    }

    #[test]
    fn test_buffer_split_across_categories() {
        // 32 GB available -> 2% = 655 MB; split over 4 categories = ~163 MB
        let res = make_resources(64.0, 32.0);
        let one = TuningProfile::from_resources(&res, 1);
        let four = TuningProfile::from_resources(&res, 4);

        assert_eq!(one.sort_buffer_bytes, 256 * MB);
        assert!(four.sort_buffer_bytes < one.sort_buffer_bytes);
        assert!(four.sort_buffer_bytes > 150 * MB);
    }

    #[test]
    fn test_buffer_limits_bounded() {
        let res = make_resources(1024.0, 512.0);
        let profile = TuningProfile::from_resources(&res, 2);
        assert_eq!(profile.sort_buffer_bytes, 256 * MB);
        assert_eq!(profile.sort_buffer_records, 256 * MB / 96);
    }

    #[test]
    fn test_buffer_limits_minimum() {
        // 256 MB available -> 2% is ~5 MB, floored at 8 MB
        let res = make_resources(1.0, 0.25);
        let profile = TuningProfile::from_resources(&res, 2);
        assert_eq!(profile.sort_buffer_bytes, 8 * MB);
    }

    #[test]
    fn test_zero_categories_treated_as_one() {
        let res = make_resources(64.0, 32.0);
        assert_eq!(
            TuningProfile::from_resources(&res, 0),
            TuningProfile::from_resources(&res, 1)
        );
    }

    #[test]
    fn test_to_sort_config() {
        let config = TuningProfile::with_buffer_bytes(16 * MB).to_sort_config();
        assert_eq!(config.buffer_byte_limit, 16 * MB);
        assert_eq!(config.buffer_record_limit, 16 * MB / 96);
        assert_eq!(config.queue_capacity, 50_000);
        assert_eq!(config.merge_fan_in, 64);
        assert!(config.spill_dir.is_none());
        config.validate().unwrap();
    }
}
