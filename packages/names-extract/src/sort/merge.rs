//! K-way merge of sorted record streams.
//!
//! Used twice by the external sort: to collapse run-files when there are
//! more of them than the configured fan-in allows, and for the final merge
//! that feeds the writer stage.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::name::NameRecord;
use crate::sort::run_file::{RunFile, RunWriter};

/// A sorted source of records for [`merge_sorted`].
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<NameRecord>> + 'a>;

/// Heap entry; ties on the name are broken by source index so the heap
/// order is total.
struct HeadEntry {
    record: NameRecord,
    source: usize,
}

impl Ord for HeadEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .cmp_by_name(&other.record)
            .then(self.source.cmp(&other.source))
    }
}

impl PartialOrd for HeadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeadEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeadEntry {}

/// Merge already-sorted streams, calling `emit` for every record in
/// ascending name order. Returns the number of records emitted.
///
/// Complexity: O(N log K) for N records across K streams; holds one
/// record per stream in memory.
pub fn merge_sorted<F>(mut sources: Vec<RecordStream<'_>>, mut emit: F) -> Result<u64>
where
    F: FnMut(NameRecord) -> Result<()>,
{
    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (source, stream) in sources.iter_mut().enumerate() {
        if let Some(record) = stream.next() {
            heap.push(Reverse(HeadEntry { record: record?, source }));
        }
    }

    let mut emitted = 0u64;
    while let Some(Reverse(HeadEntry { record, source })) = heap.pop() {
        if let Some(next) = sources[source].next() {
            heap.push(Reverse(HeadEntry { record: next?, source }));
        }
        emit(record)?;
        emitted += 1;
    }
    Ok(emitted)
}

/// Outcome of [`reduce_runs`].
#[derive(Debug)]
pub struct Reduction {
    pub runs: Vec<RunFile>,
    /// Bytes written to intermediate run-files.
    pub bytes_written: u64,
    /// Intermediate merges performed.
    pub merges: u64,
}

/// Merge run-files until at most `target` remain.
///
/// Each step merges the smallest runs, at most `fan_in` of them and no
/// more than needed to reach `target`, into one new run-file in `dir`.
/// The inputs of a step are deleted as soon as it is done. Runs already
/// under the target are returned untouched.
pub fn reduce_runs(mut runs: Vec<RunFile>, fan_in: usize, target: usize, dir: &Path) -> Result<Reduction> {
    debug_assert!(fan_in >= 2 && target >= 1);
    let mut bytes_written = 0u64;
    let mut merges = 0u64;

    while runs.len() > target {
        // Merging k runs removes k - 1 of them.
        let group_size = (runs.len() - target + 1).min(fan_in);
        runs.sort_unstable_by_key(|run| Reverse(run.byte_size()));
        let group = runs.split_off(runs.len() - group_size);

        let run = merge_group(&group, dir)?;
        drop(group);
        bytes_written += run.byte_size();
        merges += 1;
        debug!(
            merges,
            inputs = group_size,
            bytes = run.byte_size(),
            remaining = runs.len() + 1,
            "intermediate merge"
        );
        runs.push(run);
    }

    Ok(Reduction {
        runs,
        bytes_written,
        merges,
    })
}

fn merge_group(group: &[RunFile], dir: &Path) -> Result<RunFile> {
    let mut streams: Vec<RecordStream<'_>> = Vec::with_capacity(group.len());
    for run in group {
        streams.push(Box::new(run.open()?));
    }
    let mut writer = RunWriter::create(dir)?;
    merge_sorted(streams, |record| writer.push(&record))?;
    writer.finish()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(names: &[&str]) -> RecordStream<'static> {
        let records: Vec<Result<NameRecord>> = names
            .iter()
            .map(|n| Ok(NameRecord::new(*n, "Q1")))
            .collect();
        Box::new(records.into_iter())
    }

    fn write_run(dir: &Path, names: &[&str]) -> RunFile {
        let mut writer = RunWriter::create(dir).unwrap();
        for name in names {
            writer.push(&NameRecord::new(*name, "Q1")).unwrap();
        }
        writer.finish().unwrap()
    }

    fn collect(sources: Vec<RecordStream<'_>>) -> Vec<String> {
        let mut out = Vec::new();
        merge_sorted(sources, |r| {
            out.push(r.name);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn test_merge_no_sources() {
        assert!(collect(vec![]).is_empty());
    }

    #[test]
    fn test_merge_interleaves_sources() {
        let merged = collect(vec![
            stream(&["Anna", "Dora", "Gina"]),
            stream(&[]),
            stream(&["Bert", "Emil"]),
            stream(&["Carl", "Dora", "Zoe"]),
        ]);
        assert_eq!(
            merged,
            vec!["Anna", "Bert", "Carl", "Dora", "Dora", "Emil", "Gina", "Zoe"]
        );
    }

    #[test]
    fn test_merge_propagates_source_error() {
        let failing: RecordStream<'static> = Box::new(
            vec![
                Ok(NameRecord::new("Anna", "Q1")),
                Err(crate::error::ExtractError::Source("boom".into())),
            ]
            .into_iter(),
        );
        let result = merge_sorted(vec![failing, stream(&["Bert"])], |_| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_stops_on_emit_error() {
        let mut seen = 0;
        let result = merge_sorted(vec![stream(&["a", "b", "c"])], |_| {
            seen += 1;
            if seen == 2 {
                Err(crate::error::ExtractError::Aborted)
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_reduce_runs_multi_pass() {
        let dir = tempfile::tempdir().unwrap();
        let runs: Vec<RunFile> = (0..9)
            .map(|i| {
                let a = format!("name{:02}", i);
                let b = format!("name{:02}", i + 20);
                write_run(dir.path(), &[a.as_str(), b.as_str()])
            })
            .collect();
        let input_paths: Vec<_> = runs.iter().map(|r| r.path().to_path_buf()).collect();

        // 9 runs, fan-in 2, target 1: every merge removes one run
        let reduction = reduce_runs(runs, 2, 1, dir.path()).unwrap();
        assert_eq!(reduction.runs.len(), 1);
        assert_eq!(reduction.merges, 8);
        assert!(reduction.bytes_written > 0);
        assert_eq!(reduction.runs[0].len(), 18);
        for path in input_paths {
            assert!(!path.exists(), "input run {} not deleted", path.display());
        }

        let names: Vec<String> = reduction.runs[0].open().unwrap().map(|r| r.unwrap().name).collect();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_reduce_runs_counts_merges_with_wide_fan_in() {
        let dir = tempfile::tempdir().unwrap();
        let runs: Vec<RunFile> = (0..9)
            .map(|i| write_run(dir.path(), &[format!("n{}", i).as_str()]))
            .collect();

        // 9 -> 7 -> 5 -> 3 -> 2 with groups of 3, 3, 3, 2
        let reduction = reduce_runs(runs, 3, 2, dir.path()).unwrap();
        assert_eq!(reduction.runs.len(), 2);
        assert_eq!(reduction.merges, 4);
        assert_eq!(reduction.runs.iter().map(|r| r.len()).sum::<u64>(), 9);
    }

    #[test]
    fn test_reduce_runs_merges_only_what_is_needed() {
        let dir = tempfile::tempdir().unwrap();
        let big: Vec<String> = (0..200).map(|i| format!("big{:03}", i)).collect();
        let big: Vec<&str> = big.iter().map(String::as_str).collect();
        let mut runs: Vec<RunFile> = (0..4).map(|_| write_run(dir.path(), &big)).collect();
        runs.push(write_run(dir.path(), &["a"]));
        runs.push(write_run(dir.path(), &["b"]));
        let big_paths: Vec<_> = runs[..4].iter().map(|r| r.path().to_path_buf()).collect();
        let big_bytes = runs[0].byte_size();

        // One run over a target of 5: merge just the two smallest runs.
        let reduction = reduce_runs(runs, 6, 5, dir.path()).unwrap();
        assert_eq!(reduction.runs.len(), 5);
        assert_eq!(reduction.merges, 1);
        assert!(reduction.bytes_written < big_bytes);
        for path in big_paths {
            assert!(path.exists(), "large run {} was rewritten", path.display());
        }
    }

    #[test]
    fn test_reduce_runs_noop_under_target() {
        let dir = tempfile::tempdir().unwrap();
        let runs = vec![write_run(dir.path(), &["a"]), write_run(dir.path(), &["b"])];
        let reduction = reduce_runs(runs, 4, 3, dir.path()).unwrap();
        assert_eq!(reduction.runs.len(), 2);
        assert_eq!(reduction.bytes_written, 0);
        assert_eq!(reduction.merges, 0);
    }
}
