//! Per-entity classification and label collection.

use std::collections::HashSet;

use crate::class_set::{parse_item_id, ClassSet};
use crate::entity::{ClaimValue, Entity};

/// Wikidata property "instance of".
pub const INSTANCE_OF: &str = "P31";

/// Classes the entity is a direct instance of.
///
/// Only `P31` claims whose value references an item are considered;
/// unknown values, "no value" claims and non-item values are ignored.
pub fn instance_classes(entity: &Entity) -> ClassSet {
    let mut result = ClassSet::with_capacity(3);
    let Some(claims) = entity.claims.get(INSTANCE_OF) else {
        return result;
    };
    for claim in claims {
        if let ClaimValue::EntityReference(id) = claim {
            if let Some(class_id) = parse_item_id(id) {
                result.insert(class_id);
            }
        }
    }
    result
}

/// Distinct label strings across all languages, compared byte for byte.
pub fn distinct_labels(entity: &Entity) -> HashSet<&str> {
    entity.labels.values().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: &str) -> ClaimValue {
        ClaimValue::EntityReference(id.to_string())
    }

    #[test]
    fn test_instance_classes_only_reads_instance_of() {
        let entity = Entity::new("Q42")
            .with_claim(INSTANCE_OF, reference("Q5"))
            .with_claim(INSTANCE_OF, reference("Q9"))
            .with_claim("P279", reference("Q100"))
            .with_claim(INSTANCE_OF, ClaimValue::SomeValue)
            .with_claim(INSTANCE_OF, ClaimValue::NoValue)
            .with_claim(INSTANCE_OF, ClaimValue::Unresolved)
            .with_claim(INSTANCE_OF, reference("P31"));

        let classes = instance_classes(&entity);
        let mut ids: Vec<u64> = classes.iter().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![5, 9]);
    }

    #[test]
    fn test_instance_classes_empty_without_claims() {
        assert!(instance_classes(&Entity::new("Q1")).is_empty());
    }

    #[test]
    fn test_distinct_labels_deduplicates_case_sensitively() {
        let entity = Entity::new("Q42")
            .with_label("de", "Anna")
            .with_label("en", "anna")
            .with_label("fr", "Anna");

        let labels = distinct_labels(&entity);
        assert_eq!(labels.len(), 2);
        assert!(labels.contains("Anna"));
        assert!(labels.contains("anna"));
    }

    #[test]
    fn test_distinct_labels_empty() {
        assert!(distinct_labels(&Entity::new("Q1")).is_empty());
    }
}
