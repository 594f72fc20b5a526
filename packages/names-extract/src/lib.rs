//! names-extract - person names from Wikidata dumps
//!
//! One sequential pass over an entity dump classifies every entity against
//! the class closures of the configured categories (given names, family
//! names, ...) and fans its labels out to one external-sort sink per
//! category. Each sink spills sorted partitions to disk, merges them on
//! finish and writes a gzip-compressed CSV; outputs are published by
//! rename, all categories together, only when the whole pass succeeded.

pub mod class_set;
pub mod classify;
pub mod config;
pub mod dump;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod metrics;
pub mod name;
pub mod pipeline;
pub mod publish;
pub mod resource;
pub mod sink;
pub mod sort;
pub mod source;

pub use class_set::{ClassId, ClassSet};
pub use config::{default_categories, Category, ExtractConfig};
pub use entity::{ClaimValue, Entity};
pub use error::{ExtractError, Result};
pub use hierarchy::{ClassHierarchyResolver, SparqlSubclassQuery, SubclassQuery};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use name::NameRecord;
pub use pipeline::{Extractor, OutputSummary, RunSummary};
pub use resource::{ResourceManager, TuningProfile};
pub use sink::{SinkConfig, SinkStats, SortedSink};
pub use sort::{ExternalSorter, SortConfig, SortStats};
pub use source::{open_dump, JsonDumpReader};
