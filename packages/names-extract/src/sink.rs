//! Category-scoped sorted output sink.
//!
//! Each sink runs two background threads:
//!
//! ```text
//! accept() --[bounded queue]--> sort stage --[bounded queue]--> writer stage --> <final>.tmp
//! ```
//!
//! The sort stage feeds an [`ExternalSorter`]; once the input queue is
//! closed it merges and streams records to the writer, which renders CSV
//! (optionally gzip-compressed). A full input queue blocks `accept()`,
//! which keeps the scanner from outrunning the disk.
//!
//! Lifecycle: `Open` -> `finish()` -> `Staged` -> `publish()` -> `Published`.
//! `close()` does both steps. Repeated calls return the first outcome
//! without redoing any work. A sink dropped before publication is aborted:
//! threads are stopped and the temporary file is removed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, error, info, warn};

use crate::error::{ExtractError, Result};
use crate::metrics::RunMetrics;
use crate::name::NameRecord;
use crate::publish::StagedOutput;
use crate::sort::{ExternalSorter, SortConfig, SortStats};

const OUTPUT_BUFFER_SIZE: usize = 1 << 20;

/// Output settings of one sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub sort: SortConfig,
    /// Label of the second CSV column; the first is always `Name`.
    pub id_column: String,
    /// gzip level, or `None` for plain CSV.
    pub compression_level: Option<u32>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sort: SortConfig::default(),
            id_column: "EntityID".to_string(),
            compression_level: Some(9),
        }
    }
}

/// Counters of a finished sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub records_accepted: u64,
    pub records_written: u64,
    pub sort: SortStats,
}

struct Running {
    sender: Sender<NameRecord>,
    cancel: Arc<AtomicBool>,
    sort_task: JoinHandle<Result<SortStats>>,
    write_task: JoinHandle<Result<u64>>,
    staged: StagedOutput,
}

enum SinkState {
    Open(Running),
    Staged { staged: StagedOutput, stats: SinkStats },
    Published { path: PathBuf, stats: SinkStats },
    Failed(ExtractError),
    Aborted,
}

pub struct SortedSink {
    category: String,
    final_path: PathBuf,
    accepted: u64,
    state: SinkState,
    metrics: Arc<RunMetrics>,
}

impl SortedSink {
    /// Create the temporary output file and start the background stages.
    pub fn open(
        category: impl Into<String>,
        final_path: impl Into<PathBuf>,
        config: &SinkConfig,
        metrics: Arc<RunMetrics>,
    ) -> Result<Self> {
        Self::start(category, final_path, config, metrics, None)
    }

    /// `gate`, when set, holds the sort stage until it yields a value or
    /// disconnects.
    fn start(
        category: impl Into<String>,
        final_path: impl Into<PathBuf>,
        config: &SinkConfig,
        metrics: Arc<RunMetrics>,
        gate: Option<Receiver<()>>,
    ) -> Result<Self> {
        let category = category.into();
        let final_path = final_path.into();
        config.sort.validate()?;

        let staged = StagedOutput::new(&final_path);
        let file = staged.create_file()?;
        let spill_dir = config
            .sort
            .spill_dir
            .clone()
            .unwrap_or_else(|| parent_dir(&final_path));

        let (sender, input) = bounded::<NameRecord>(config.sort.queue_capacity);
        let (sorted_tx, sorted_rx) = bounded::<NameRecord>(config.sort.output_queue_capacity);
        let cancel = Arc::new(AtomicBool::new(false));

        let sorter = ExternalSorter::new(config.sort.clone(), spill_dir).with_metrics(Arc::clone(&metrics));
        let sort_task = {
            let category = category.clone();
            let cancel = Arc::clone(&cancel);
            spawn_stage(format!("sort-{}", category), move || {
                if let Some(gate) = gate {
                    let _ = gate.recv();
                }
                sort_stage(&category, sorter, input, sorted_tx, &cancel)
            })
        };
        let spawned = match sort_task {
            Ok(sort_task) => {
                let header = ["Name".to_string(), config.id_column.clone()];
                let level = config.compression_level;
                spawn_stage(format!("write-{}", category), move || {
                    write_stage(file, header, level, sorted_rx)
                })
                .map(|write_task| (sort_task, write_task))
            }
            Err(e) => Err(e),
        };
        let (sort_task, write_task) = match spawned {
            Ok(tasks) => tasks,
            Err(e) => {
                // Dropping the sender and receivers stops any stage that did start.
                cancel.store(true, Ordering::Release);
                let _ = staged.discard();
                return Err(e);
            }
        };

        debug!(category = %category, path = %final_path.display(), "opened sorted sink");
        Ok(Self {
            category,
            final_path,
            accepted: 0,
            state: SinkState::Open(Running {
                sender,
                cancel,
                sort_task,
                write_task,
                staged,
            }),
            metrics,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Records accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Hand one record to the sort stage. Blocks while the queue is full.
    ///
    /// If a background stage has failed, the sink is shut down and that
    /// stage's error is returned.
    pub fn accept(&mut self, record: NameRecord) -> Result<()> {
        let sent = match &self.state {
            SinkState::Open(running) => running.sender.send(record).is_ok(),
            _ => return Err(ExtractError::SinkClosed(self.category.clone())),
        };
        if sent {
            self.accepted += 1;
            return Ok(());
        }

        // The sort stage hung up: collect its error.
        let err = match mem::replace(&mut self.state, SinkState::Aborted) {
            SinkState::Open(running) => self.shut_down(running),
            _ => ExtractError::SinkClosed(self.category.clone()),
        };
        error!(category = %self.category, error = %err, "sink failed while accepting");
        self.state = SinkState::Failed(err.replay(&self.category));
        Err(err)
    }

    /// Drain the queue, merge, and write the complete output to the
    /// temporary path. Idempotent.
    pub fn finish(&mut self) -> Result<SinkStats> {
        match mem::replace(&mut self.state, SinkState::Aborted) {
            SinkState::Open(running) => match self.drain(running) {
                Ok((staged, stats)) => {
                    info!(
                        category = %self.category,
                        records = stats.records_written,
                        spills = stats.sort.spills,
                        "sorted output staged"
                    );
                    self.state = SinkState::Staged {
                        staged,
                        stats: stats.clone(),
                    };
                    Ok(stats)
                }
                Err(err) => {
                    error!(category = %self.category, error = %err, "sink failed");
                    self.state = SinkState::Failed(err.replay(&self.category));
                    Err(err)
                }
            },
            state => {
                let result = self.outcome(&state);
                self.state = state;
                result
            }
        }
    }

    /// Move a staged output to its final path. Idempotent once published.
    pub fn publish(&mut self) -> Result<PathBuf> {
        match mem::replace(&mut self.state, SinkState::Aborted) {
            SinkState::Staged { staged, stats } => match staged.commit() {
                Ok(path) => {
                    self.metrics.record_published();
                    info!(category = %self.category, path = %path.display(), "published");
                    self.state = SinkState::Published {
                        path: path.clone(),
                        stats,
                    };
                    Ok(path)
                }
                Err(err) => {
                    self.state = SinkState::Failed(err.replay(&self.category));
                    Err(err)
                }
            },
            SinkState::Published { path, stats } => {
                self.state = SinkState::Published {
                    path: path.clone(),
                    stats,
                };
                Ok(path)
            }
            SinkState::Open(running) => {
                self.state = SinkState::Open(running);
                Err(ExtractError::sort(&self.category, "publish called before finish"))
            }
            state => {
                let result = self.outcome(&state).map(|_| self.final_path.clone());
                self.state = state;
                result
            }
        }
    }

    /// `finish()` followed by `publish()`. Calling it again returns the
    /// first outcome and does not re-publish.
    pub fn close(&mut self) -> Result<SinkStats> {
        let stats = self.finish()?;
        self.publish()?;
        Ok(stats)
    }

    /// Stop the background stages and remove the temporary output.
    ///
    /// Has no effect on a published sink.
    pub fn abort(&mut self) {
        match mem::replace(&mut self.state, SinkState::Aborted) {
            SinkState::Open(running) => {
                running.cancel.store(true, Ordering::Release);
                let staged = self.join_stages(running).1;
                self.discard(&staged);
                debug!(category = %self.category, "sink aborted");
            }
            SinkState::Staged { staged, .. } => {
                self.discard(&staged);
                debug!(category = %self.category, "staged output discarded");
            }
            published @ SinkState::Published { .. } => self.state = published,
            SinkState::Failed(_) | SinkState::Aborted => {}
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.state, SinkState::Published { .. })
    }

    // -- internals ------------------------------------------------------------

    fn outcome(&self, state: &SinkState) -> Result<SinkStats> {
        match state {
            SinkState::Staged { stats, .. } | SinkState::Published { stats, .. } => Ok(stats.clone()),
            SinkState::Failed(err) => Err(err.replay(&self.category)),
            SinkState::Aborted => Err(ExtractError::Aborted),
            SinkState::Open(_) => Err(ExtractError::sort(&self.category, "sink still open")),
        }
    }

    fn drain(&self, running: Running) -> Result<(StagedOutput, SinkStats)> {
        let (result, staged) = self.join_stages(running);
        match result {
            Ok((sort, records_written)) => {
                if records_written != self.accepted {
                    self.discard(&staged);
                    return Err(ExtractError::sort(
                        &self.category,
                        format!("accepted {} records but wrote {}", self.accepted, records_written),
                    ));
                }
                self.metrics.record_written(records_written);
                let stats = SinkStats {
                    records_accepted: self.accepted,
                    records_written,
                    sort,
                };
                Ok((staged, stats))
            }
            Err(err) => {
                self.discard(&staged);
                Err(err)
            }
        }
    }

    /// Close the input queue and wait for both stages.
    ///
    /// A writer failure takes precedence: it makes the sort stage fail too,
    /// with a less useful message.
    fn join_stages(&self, running: Running) -> (Result<(SortStats, u64)>, StagedOutput) {
        let Running {
            sender,
            sort_task,
            write_task,
            staged,
            ..
        } = running;
        drop(sender);

        let sorted = join_stage(&self.category, sort_task);
        let written = join_stage(&self.category, write_task);
        let result = match (sorted, written) {
            (_, Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Ok(sort), Ok(written)) => Ok((sort, written)),
        };
        (result, staged)
    }

    fn shut_down(&self, running: Running) -> ExtractError {
        running.cancel.store(true, Ordering::Release);
        let (result, staged) = self.join_stages(running);
        self.discard(&staged);
        match result {
            Err(e) => e,
            Ok(_) => ExtractError::SinkClosed(self.category.clone()),
        }
    }

    fn discard(&self, staged: &StagedOutput) {
        if let Err(e) = staged.discard() {
            warn!(category = %self.category, error = %e, "failed to remove temporary output");
        }
    }
}

impl Drop for SortedSink {
    fn drop(&mut self) {
        if matches!(self.state, SinkState::Open(_) | SinkState::Staged { .. }) {
            self.abort();
        }
    }
}

// ── Background stages ──────────────────────────────────────────────

fn spawn_stage<T, F>(name: String, f: F) -> Result<JoinHandle<Result<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    Ok(thread::Builder::new().name(name).spawn(f)?)
}

fn join_stage<T>(category: &str, task: JoinHandle<Result<T>>) -> Result<T> {
    task.join()
        .unwrap_or_else(|_| Err(ExtractError::sort(category, "background stage panicked")))
}

fn sort_stage(
    category: &str,
    mut sorter: ExternalSorter,
    input: Receiver<NameRecord>,
    output: Sender<NameRecord>,
    cancel: &AtomicBool,
) -> Result<SortStats> {
    for record in input.iter() {
        if cancel.load(Ordering::Acquire) {
            return Err(ExtractError::Aborted);
        }
        sorter.push(record).map_err(|e| ExtractError::sort(category, e))?;
    }
    if cancel.load(Ordering::Acquire) {
        return Err(ExtractError::Aborted);
    }
    drop(input);

    sorter
        .finish(|record| {
            output
                .send(record)
                .map_err(|_| ExtractError::sort(category, "writer stage stopped"))
        })
        .map_err(|e| match e {
            ExtractError::Sort { .. } => e,
            other => ExtractError::sort(category, other),
        })
}

fn write_stage(
    file: File,
    header: [String; 2],
    compression_level: Option<u32>,
    sorted: Receiver<NameRecord>,
) -> Result<u64> {
    let buffered = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);
    let (buffered, written) = match compression_level {
        Some(level) => {
            let encoder = GzEncoder::new(buffered, Compression::new(level));
            let (encoder, written) = write_rows(encoder, &header, &sorted)?;
            (encoder.finish()?, written)
        }
        None => write_rows(buffered, &header, &sorted)?,
    };
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(written)
}

fn write_rows<W: Write>(
    out: W,
    header: &[String; 2],
    sorted: &Receiver<NameRecord>,
) -> Result<(W, u64)> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer.write_record(header)?;
    let mut written = 0u64;
    for record in sorted.iter() {
        writer.write_record([record.name.as_str(), record.id.as_str()])?;
        written += 1;
    }
    writer.flush()?;
    let out = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(e.error().kind(), e.error().to_string()))?;
    Ok((out, written))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
