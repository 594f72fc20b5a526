//! External sort for name records.
//!
//! Spills sorted partitions to temporary run-files once the in-memory
//! buffer fills up, then k-way merges the run-files with the last
//! partition. Merge fan-in is bounded; extra run-files are collapsed in
//! intermediate passes first.

pub mod types;
pub mod run_file;
pub mod merge;
pub mod sorter;

pub use types::*;
pub use run_file::{RunFile, RunReader, RunWriter};
pub use merge::{merge_sorted, reduce_runs, RecordStream, Reduction};
pub use sorter::ExternalSorter;
