//! Bounded-memory external sort of name records.
//!
//! Records accumulate in an in-memory partition. When the partition
//! exceeds the byte or record limit it is sorted and spilled to a
//! run-file. `finish()` sorts the last partition, collapses run-files
//! until the final merge fits the fan-in, and merges everything into the
//! caller's sink.

use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::metrics::RunMetrics;
use crate::name::NameRecord;
use crate::sort::merge::{merge_sorted, reduce_runs, RecordStream};
use crate::sort::run_file::{RunFile, RunWriter};
use crate::sort::types::{SortConfig, SortStats};

pub struct ExternalSorter {
    config: SortConfig,
    spill_dir: PathBuf,
    buffer: Vec<NameRecord>,
    buffer_bytes: usize,
    runs: Vec<RunFile>,
    stats: SortStats,
    metrics: Option<Arc<RunMetrics>>,
}

impl ExternalSorter {
    pub fn new(config: SortConfig, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            spill_dir: spill_dir.into(),
            buffer: Vec::new(),
            buffer_bytes: 0,
            runs: Vec::new(),
            stats: SortStats::default(),
            metrics: None,
        }
    }

    /// Report spills to shared run metrics as they happen.
    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn push(&mut self, record: NameRecord) -> Result<()> {
        self.buffer_bytes += record.heap_size();
        self.buffer.push(record);
        self.stats.records_in += 1;

        if self.buffer_bytes >= self.config.buffer_byte_limit
            || self.buffer.len() >= self.config.buffer_record_limit
        {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.sort_unstable_by(NameRecord::cmp_by_name);

        let mut writer = RunWriter::create(&self.spill_dir)?;
        for record in &self.buffer {
            writer.push(record)?;
        }
        let run = writer.finish()?;

        self.stats.spills += 1;
        self.stats.bytes_spilled += run.byte_size();
        if let Some(metrics) = &self.metrics {
            metrics.record_spill(run.byte_size());
        }
        debug!(
            records = run.len(),
            bytes = run.byte_size(),
            runs = self.runs.len() + 1,
            "spilled sorted partition"
        );

        self.runs.push(run);
        self.buffer.clear();
        self.buffer_bytes = 0;
        Ok(())
    }

    /// Emit every pushed record in ascending name order.
    ///
    /// Run-files are deleted when this returns, on success or failure.
    pub fn finish<F>(mut self, emit: F) -> Result<SortStats>
    where
        F: FnMut(NameRecord) -> Result<()>,
    {
        let mut memory = mem::take(&mut self.buffer);
        memory.sort_unstable_by(NameRecord::cmp_by_name);

        // Leave one slot of the final merge for the in-memory partition.
        let target = self.config.merge_fan_in.saturating_sub(1).max(1);
        let runs = mem::take(&mut self.runs);
        let reduction = reduce_runs(runs, self.config.merge_fan_in.max(2), target, &self.spill_dir)?;
        let runs = reduction.runs;
        if reduction.merges > 0 {
            self.stats.intermediate_merges += reduction.merges;
            self.stats.bytes_spilled += reduction.bytes_written;
            if let Some(metrics) = &self.metrics {
                metrics.record_merge_bytes(reduction.bytes_written);
            }
        }

        let mut streams: Vec<RecordStream<'_>> = Vec::with_capacity(runs.len() + 1);
        for run in &runs {
            streams.push(Box::new(run.open()?));
        }
        streams.push(Box::new(memory.into_iter().map(Ok)));

        self.stats.records_out = merge_sorted(streams, emit)?;
        debug!(
            records = self.stats.records_out,
            runs = runs.len(),
            "final merge complete"
        );
        Ok(self.stats)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
