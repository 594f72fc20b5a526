//! Sets of Wikidata class identifiers.
//!
//! Classes are stored by their numeric Q-id (`Q5` -> 5). The only
//! operations the pipeline needs are membership and "do these two sets
//! share an element", which probes the larger set with the smaller one.

use std::collections::HashSet;

/// Numeric part of a Wikidata item id (`Q202444` -> 202444).
pub type ClassId = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSet {
    ids: HashSet<ClassId>,
}

impl ClassSet {
    pub fn new() -> Self {
        Self { ids: HashSet::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Returns true if the id was not present yet.
    pub fn insert(&mut self, id: ClassId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.ids.contains(&id)
    }

    /// True iff some id is a member of both sets.
    ///
    /// Iterates the smaller set and probes the larger one, returning on the
    /// first hit. Complexity: O(min(|self|, |other|)).
    pub fn intersects_any(&self, other: &ClassSet) -> bool {
        let (small, large) = if self.ids.len() <= other.ids.len() {
            (&self.ids, &other.ids)
        } else {
            (&other.ids, &self.ids)
        };
        small.iter().any(|id| large.contains(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<ClassId> for ClassSet {
    fn from_iter<I: IntoIterator<Item = ClassId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<ClassId> for ClassSet {
    fn extend<I: IntoIterator<Item = ClassId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

/// Parse a Wikidata item id such as `Q42` into its numeric part.
///
/// Accepts the bare form and the `http://www.wikidata.org/entity/Q42`
/// URI form returned by the query service. Anything else yields `None`.
pub fn parse_item_id(raw: &str) -> Option<ClassId> {
    const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";
    let raw = raw.trim();
    let local = raw.strip_prefix(ENTITY_PREFIX).unwrap_or(raw);
    let digits = local.strip_prefix('Q')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ── Tests ──────────────────────────────────────────────────────────
