//! Run configuration.
//!
//! Everything the pipeline needs is carried by [`ExtractConfig`]; the CLI
//! only fills it in. Defaults reproduce the published extraction: family
//! names and given names, gzip level 9, `Name,WikidataID` header.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::class_set::{parse_item_id, ClassId};
use crate::error::{ExtractError, Result};
use crate::sort::SortConfig;

/// Named output grouping, defined by the root class of its hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub root_class: ClassId,
}

impl Category {
    pub fn new(name: impl Into<String>, root_class: ClassId) -> Self {
        Self {
            name: name.into(),
            root_class,
        }
    }
}

impl FromStr for Category {
    type Err = ExtractError;

    /// Parses `familynames=Q101352`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, class) = s
            .split_once('=')
            .ok_or_else(|| ExtractError::Config(format!("expected <name>=<Qid>, got '{}'", s)))?;
        validate_category_name(name)?;
        let root_class = parse_item_id(class)
            .ok_or_else(|| ExtractError::Config(format!("invalid class id '{}'", class)))?;
        Ok(Category::new(name, root_class))
    }
}

/// Category names become file name prefixes; keep them to `[A-Za-z0-9_-]`.
fn validate_category_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(ExtractError::Config(
            "category name must be 1-64 characters".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ExtractError::Config(format!(
            "category name '{}' can only contain a-z, A-Z, 0-9, _, -",
            name
        )));
    }
    Ok(())
}

/// Family names (Q101352) and given names (Q202444).
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("familynames", 101352),
        Category::new("givennames", 202444),
    ]
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Directory receiving the published `<category>-<date>.csv.gz` files.
    pub workdir: PathBuf,
    pub categories: Vec<Category>,
    pub sort: SortConfig,
    /// Label of the second CSV column.
    pub id_column: String,
    /// gzip level, 0-9.
    pub compression_level: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            categories: default_categories(),
            sort: SortConfig::default(),
            id_column: "WikidataID".to_string(),
            compression_level: 9,
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(ExtractError::Config("no categories configured".to_string()));
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            validate_category_name(&category.name)?;
            if !seen.insert(category.name.as_str()) {
                return Err(ExtractError::Config(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
        }
        if self.compression_level > 9 {
            return Err(ExtractError::Config(format!(
                "compression level {} out of range 0-9",
                self.compression_level
            )));
        }
        self.sort.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str() {
        let c: Category = "familynames=Q101352".parse().unwrap();
        assert_eq!(c, Category::new("familynames", 101352));

        assert!("familynames".parse::<Category>().is_err());
        assert!("family names=Q1".parse::<Category>().is_err());
        assert!("=Q1".parse::<Category>().is_err());
        assert!("x=P31".parse::<Category>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ExtractConfig::default();
        config.validate().unwrap();
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.id_column, "WikidataID");
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let mut config = ExtractConfig::default();
        config.categories.push(Category::new("givennames", 1));
        assert!(config.validate().is_err());

        config.categories.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_compression_level() {
        let config = ExtractConfig {
            compression_level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
