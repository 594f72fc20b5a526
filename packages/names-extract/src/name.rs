//! Name records emitted by the extraction.

use std::cmp::Ordering;
use std::mem;

use serde::{Deserialize, Serialize};

/// One output row: a label and the entity it was taken from.
///
/// Records are ordered by `name` only; two records with the same name may
/// come out of a sort in either order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub id: String,
}

impl NameRecord {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Sort key comparison.
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name.as_bytes().cmp(other.name.as_bytes())
    }

    /// Approximate in-memory footprint, used for spill accounting.
    pub fn heap_size(&self) -> usize {
        mem::size_of::<Self>() + self.name.capacity() + self.id.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_by_name_ignores_id() {
        let anna = NameRecord::new("Anna", "Q123");
        let bob = NameRecord::new("Bob", "Q124");
        assert_eq!(anna.cmp_by_name(&bob), Ordering::Less);
        assert_eq!(anna.cmp_by_name(&anna), Ordering::Equal);
        assert_eq!(
            NameRecord::new("Anna", "Q1").cmp_by_name(&NameRecord::new("Anna", "Q2")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_cmp_by_name_is_bytewise() {
        // Uppercase sorts before lowercase, non-ASCII after both.
        let upper = NameRecord::new("Zoe", "Q1");
        let lower = NameRecord::new("anna", "Q2");
        let accented = NameRecord::new("Émile", "Q3");
        assert_eq!(upper.cmp_by_name(&lower), Ordering::Less);
        assert_eq!(lower.cmp_by_name(&accented), Ordering::Less);
    }

    #[test]
    fn test_heap_size_grows_with_content() {
        let short = NameRecord::new("A", "Q1");
        let long = NameRecord::new("A".repeat(100), "Q1");
        assert!(long.heap_size() > short.heap_size());
        assert!(short.heap_size() >= mem::size_of::<NameRecord>());
    }
}
