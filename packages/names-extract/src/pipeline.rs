//! Single-pass extraction run.
//!
//! ```text
//! resolve closures -> open sinks -> scan entities -> finish sinks -> publish batch
//! ```
//!
//! The scan is sequential. Each entity is classified once; for every
//! category whose closure intersects its classes, one record per distinct
//! label goes to that category's sink. Outputs are published together
//! only after every sink staged its file; any failure before that leaves
//! all previously published files untouched.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::class_set::ClassSet;
use crate::classify::{distinct_labels, instance_classes};
use crate::config::{Category, ExtractConfig};
use crate::dump::output_file_name;
use crate::entity::Entity;
use crate::error::Result;
use crate::hierarchy::{ClassHierarchyResolver, SubclassQuery};
use crate::metrics::{MetricsSnapshot, RunMetrics, PROGRESS_INTERVAL};
use crate::name::NameRecord;
use crate::sink::{SinkConfig, SinkStats, SortedSink};

/// One published output of a successful run.
#[derive(Debug, Clone)]
pub struct OutputSummary {
    pub category: String,
    pub path: PathBuf,
    pub stats: SinkStats,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub outputs: Vec<OutputSummary>,
    pub metrics: MetricsSnapshot,
}

/// A category's resolved closure and its open sink.
struct Target {
    classes: ClassSet,
    sink: SortedSink,
}

pub struct Extractor<Q> {
    config: ExtractConfig,
    resolver: ClassHierarchyResolver<Q>,
    metrics: Arc<RunMetrics>,
}

impl<Q: SubclassQuery> Extractor<Q> {
    pub fn new(config: ExtractConfig, query: Q) -> Self {
        Self {
            config,
            resolver: ClassHierarchyResolver::new(query),
            metrics: Arc::new(RunMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Process one dump snapshot.
    ///
    /// `date` names the outputs (`<category>-<YYYYMMDD>.csv.gz` under the
    /// work directory). On error nothing is published.
    pub fn run<I>(&self, date: NaiveDate, entities: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Entity>>,
    {
        self.config.validate()?;
        info!(date = %date, categories = self.config.categories.len(), "starting extraction run");

        // Resolve everything before creating any file.
        let mut closures = Vec::with_capacity(self.config.categories.len());
        for category in &self.config.categories {
            closures.push(self.resolve(category)?);
        }

        let mut targets = self.open_sinks(date, closures)?;

        if let Err(err) = self.scan(&mut targets, entities) {
            error!(error = %err, code = err.code(), "scan failed, abandoning outputs");
            abort_all(&mut targets);
            return Err(err);
        }

        let stats = self.finish_all(&mut targets)?;
        let outputs = publish_all(&mut targets, stats)?;

        let metrics = self.metrics.snapshot();
        info!(
            entities = metrics.entities_scanned,
            matched = metrics.entities_matched,
            records = metrics.records_written,
            spills = metrics.spills,
            elapsed_ms = metrics.elapsed_ms,
            "extraction run complete"
        );
        Ok(RunSummary {
            date,
            outputs,
            metrics,
        })
    }

    fn resolve(&self, category: &Category) -> Result<(Category, ClassSet)> {
        let classes = self.resolver.resolve(category.root_class)?;
        info!(
            category = %category.name,
            root = %format!("Q{}", category.root_class),
            classes = classes.len(),
            "resolved class closure"
        );
        Ok((category.clone(), classes))
    }

    fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            sort: self.config.sort.clone(),
            id_column: self.config.id_column.clone(),
            compression_level: Some(self.config.compression_level),
        }
    }

    fn open_sinks(&self, date: NaiveDate, closures: Vec<(Category, ClassSet)>) -> Result<Vec<Target>> {
        let sink_config = self.sink_config();
        let mut targets: Vec<Target> = Vec::with_capacity(closures.len());
        for (category, classes) in closures {
            let path = self.config.workdir.join(output_file_name(&category.name, date));
            match SortedSink::open(category.name, path, &sink_config, Arc::clone(&self.metrics)) {
                Ok(sink) => targets.push(Target { classes, sink }),
                Err(err) => {
                    abort_all(&mut targets);
                    return Err(err);
                }
            }
        }
        Ok(targets)
    }

    fn scan<I>(&self, targets: &mut [Target], entities: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Entity>>,
    {
        for entity in entities {
            let entity = entity?;
            let classes = instance_classes(&entity);
            let mut matched = false;

            if !classes.is_empty() {
                let mut labels = None;
                for target in targets.iter_mut() {
                    if !target.classes.intersects_any(&classes) {
                        continue;
                    }
                    matched = true;
                    let labels = labels.get_or_insert_with(|| distinct_labels(&entity));
                    for label in labels.iter() {
                        target.sink.accept(NameRecord::new(*label, entity.id.as_str()))?;
                    }
                    self.metrics.record_accepted(labels.len() as u64);
                }
            }

            let scanned = self.metrics.record_entity(matched);
            if scanned % PROGRESS_INTERVAL == 0 {
                let snap = self.metrics.snapshot();
                info!(
                    entities = scanned,
                    matched = snap.entities_matched,
                    records = snap.records_accepted,
                    per_sec = snap.entities_per_sec as u64,
                    "scan progress"
                );
            }
        }
        Ok(())
    }

    /// Stage every sink, even after one fails, then keep or drop them as a
    /// batch.
    fn finish_all(&self, targets: &mut [Target]) -> Result<Vec<SinkStats>> {
        let mut stats = Vec::with_capacity(targets.len());
        let mut first_err = None;
        for target in targets.iter_mut() {
            match target.sink.finish() {
                Ok(s) => stats.push(s),
                Err(err) => {
                    error!(
                        category = %target.sink.category(),
                        accepted = target.sink.accepted(),
                        error = %err,
                        "sink failed to finish"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => {
                abort_all(targets);
                Err(err)
            }
            None => Ok(stats),
        }
    }
}

fn publish_all(targets: &mut [Target], stats: Vec<SinkStats>) -> Result<Vec<OutputSummary>> {
    let mut outputs = Vec::with_capacity(targets.len());
    for (i, stats) in stats.into_iter().enumerate() {
        let sink = &mut targets[i].sink;
        match sink.publish() {
            Ok(path) => outputs.push(OutputSummary {
                category: sink.category().to_string(),
                path,
                stats,
            }),
            Err(err) => {
                error!(
                    category = %sink.category(),
                    path = %sink.final_path().display(),
                    error = %err,
                    "publish failed"
                );
                if i > 0 {
                    warn!(published = i, "publish failed after some outputs were renamed");
                }
                abort_all(targets);
                return Err(err);
            }
        }
    }
    Ok(outputs)
}

fn abort_all(targets: &mut [Target]) {
    for target in targets.iter_mut() {
        target.sink.abort();
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ClaimValue;
    use crate::error::ExtractError;
    use crate::sort::SortConfig;
    use std::collections::HashMap;

    /// Closure lookups answered from a fixed table.
    struct TableQuery(HashMap<u64, Vec<&'static str>>);

    impl SubclassQuery for TableQuery {
        fn transitive_subclasses(&self, root: u64) -> Result<Vec<String>> {
            Ok(self
                .0
                .get(&root)
                .map(|ids| ids.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default())
        }
    }

    fn person(id: &str, class: &str, labels: &[(&str, &str)]) -> Entity {
        let mut entity = Entity::new(id).with_claim("P31", ClaimValue::EntityReference(class.to_string()));
        for (lang, value) in labels {
            entity = entity.with_label(*lang, *value);
        }
        entity
    }

    fn config(dir: &std::path::Path) -> ExtractConfig {
        ExtractConfig {
            workdir: dir.to_path_buf(),
            categories: vec![Category::new("given", 1), Category::new("family", 2)],
            sort: SortConfig {
                buffer_record_limit: 3,
                ..Default::default()
            },
            compression_level: 1,
            ..Default::default()
        }
    }

    fn query() -> TableQuery {
        TableQuery(HashMap::from([(1, vec!["Q5", "Q9"]), (2, vec!["Q20"])]))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 4, 18).unwrap()
    }

    #[test]
    fn test_run_fans_out_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(config(dir.path()), query());
        let entities = vec![
            Ok(person("Q42", "Q5", &[("en", "Anna"), ("de", "anna"), ("fr", "Anna")])),
            Ok(person("Q7", "Q20", &[("en", "Smith")])),
            Ok(person("Q8", "Q999", &[("en", "Nobody")])),
            Ok(Entity::new("Q9").with_label("en", "Unclassified")),
        ];

        let summary = extractor.run(date(), entities).unwrap();
        assert_eq!(summary.outputs.len(), 2);
        assert_eq!(summary.outputs[0].category, "given");
        assert_eq!(summary.outputs[0].stats.records_written, 2);
        assert_eq!(summary.outputs[1].stats.records_written, 1);
        assert_eq!(summary.metrics.entities_scanned, 4);
        assert_eq!(summary.metrics.entities_matched, 2);
        assert_eq!(summary.metrics.records_accepted, 3);
        assert_eq!(summary.metrics.outputs_published, 2);
        assert!(dir.path().join("given-20230418.csv.gz").exists());
        assert!(dir.path().join("family-20230418.csv.gz").exists());
    }

    #[test]
    fn test_entity_in_two_categories_goes_to_both() {
        let dir = tempfile::tempdir().unwrap();
        let query = TableQuery(HashMap::from([(1, vec!["Q5"]), (2, vec!["Q5"])]));
        let extractor = Extractor::new(config(dir.path()), query);
        let summary = extractor
            .run(date(), vec![Ok(person("Q1", "Q5", &[("en", "Jordan")]))])
            .unwrap();
        assert!(summary.outputs.iter().all(|o| o.stats.records_written == 1));
    }

    #[test]
    fn test_source_error_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(config(dir.path()), query());
        let entities = vec![
            Ok(person("Q42", "Q5", &[("en", "Anna")])),
            Err(ExtractError::Source("truncated dump".into())),
            Ok(person("Q43", "Q5", &[("en", "Bert")])),
        ];

        let err = extractor.run(date(), entities).unwrap_err();
        assert_eq!(err.code(), "SOURCE_ERROR");
        assert_eq!(extractor.metrics().snapshot().entities_scanned, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_resolution_failure_creates_no_files() {
        struct Down;
        impl SubclassQuery for Down {
            fn transitive_subclasses(&self, _root: u64) -> Result<Vec<String>> {
                Err(ExtractError::Source("connection refused".into()))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(config(dir.path()), Down);
        let err = extractor.run(date(), Vec::new()).unwrap_err();
        assert_eq!(err.code(), "RESOLUTION_ERROR");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected_before_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.categories.clear();
        let err = Extractor::new(cfg, query()).run(date(), Vec::new()).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }
}
