//! Class hierarchy resolution.
//!
//! A category is defined by a root class; an entity belongs to the
//! category if it is an instance of the root or of any class that
//! transitively subclasses it (`wdt:P279*`). The closure is fetched once
//! per category per run from the Wikidata query service and then held
//! immutable.

use std::io::Read;

use tracing::debug;

use crate::class_set::{parse_item_id, ClassId, ClassSet};
use crate::error::{ExtractError, Result};

/// Public Wikidata SPARQL endpoint.
pub const DEFAULT_SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// User agent sent with every query, as requested by the query service policy.
pub const DEFAULT_USER_AGENT: &str = "WikidataNamesBot/1.0";

/// Source of the transitive-subclass closure of a class.
///
/// Returns raw identifiers exactly as the upstream service delivers them;
/// the resolver decides which ones are usable.
pub trait SubclassQuery {
    fn transitive_subclasses(&self, root: ClassId) -> Result<Vec<String>>;
}

impl<T: SubclassQuery + ?Sized> SubclassQuery for &T {
    fn transitive_subclasses(&self, root: ClassId) -> Result<Vec<String>> {
        (**self).transitive_subclasses(root)
    }
}

// ── Resolver ───────────────────────────────────────────────────────

/// Turns the raw closure of a root class into a [`ClassSet`].
pub struct ClassHierarchyResolver<Q> {
    query: Q,
}

impl<Q: SubclassQuery> ClassHierarchyResolver<Q> {
    pub fn new(query: Q) -> Self {
        Self { query }
    }

    /// Resolve `root` and all its transitive subclasses.
    ///
    /// The root itself is always a member. Entries that are not item ids
    /// are skipped. Any failure of the underlying query is returned as
    /// [`ExtractError::Resolution`] and is not retried.
    pub fn resolve(&self, root: ClassId) -> Result<ClassSet> {
        let raw = self.query.transitive_subclasses(root).map_err(|e| match e {
            ExtractError::Resolution { .. } => e,
            other => ExtractError::Resolution {
                class_id: root,
                message: other.to_string(),
            },
        })?;

        let mut classes = ClassSet::with_capacity(raw.len() + 1);
        classes.insert(root);
        let mut skipped = 0usize;
        for entry in &raw {
            match parse_item_id(entry) {
                Some(id) => {
                    classes.insert(id);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(root, skipped, "ignored malformed subclass identifiers");
        }
        debug!(root, classes = classes.len(), "resolved class hierarchy");
        Ok(classes)
    }
}

// ── SPARQL transport ───────────────────────────────────────────────

/// Queries the Wikidata SPARQL endpoint for `?subclass wdt:P279* wd:Q<root>`.
pub struct SparqlSubclassQuery {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl SparqlSubclassQuery {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn query_text(root: ClassId) -> String {
        format!("SELECT ?subclass WHERE {{?subclass wdt:P279* wd:Q{}. }}", root)
    }
}

impl SubclassQuery for SparqlSubclassQuery {
    fn transitive_subclasses(&self, root: ClassId) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", Self::query_text(root))])
            .header(reqwest::header::ACCEPT, "text/csv")
            .send()?
            .error_for_status()?;
        parse_subclass_csv(response)
    }
}

/// Read the CSV result of a subclass query.
///
/// The first row is the column header. Every following row with exactly
/// one field contributes that field; other rows are ignored.
pub fn parse_subclass_csv<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut out = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.len() == 1 {
            out.push(record[0].to_string());
        }
    }
    Ok(out)
}

// ── Tests ──────────────────────────────────────────────────────────
