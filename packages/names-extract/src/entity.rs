//! Entity records as they appear in the Wikidata JSON dump.
//!
//! The dump encodes claim values as loosely typed JSON. On load every main
//! snak is narrowed to a [`ClaimValue`]; only entity references carry data
//! the pipeline uses, everything else is kept as a tag so callers can
//! ignore it explicitly.

use std::collections::HashMap;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

use crate::error::Result;

/// Value of a single claim's main snak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    /// Reference to another entity, e.g. `Q5`.
    EntityReference(String),
    /// The claim explicitly states that there is no value.
    NoValue,
    /// The claim states that a value exists but is unknown.
    SomeValue,
    /// A value of some other type (string, time, quantity, ...).
    Unresolved,
}

/// One knowledge-base entity: id, claims keyed by property id, and labels
/// keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub id: String,
    pub claims: HashMap<String, Vec<ClaimValue>>,
    pub labels: HashMap<String, String>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, language: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(language.into(), value.into());
        self
    }

    pub fn with_claim(mut self, property: impl Into<String>, value: ClaimValue) -> Self {
        self.claims.entry(property.into()).or_default().push(value);
        self
    }

    /// Parse one entity object from the JSON dump.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawEntity = serde_json::from_str(json)?;
        Ok(raw.into())
    }
}

// ── Dump JSON shape ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawEntity {
    id: String,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    labels: HashMap<String, RawLabel>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    claims: HashMap<String, Vec<RawStatement>>,
}

#[derive(Deserialize)]
struct RawLabel {
    value: String,
}

#[derive(Deserialize)]
struct RawStatement {
    mainsnak: RawSnak,
}

#[derive(Deserialize)]
struct RawSnak {
    snaktype: String,
    #[serde(default)]
    datavalue: Option<RawDataValue>,
}

#[derive(Deserialize)]
struct RawDataValue {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

/// Empty maps are sometimes serialized as `[]` in the dump.
fn map_or_empty_list<'de, D, T>(deserializer: D) -> std::result::Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList<T> {
        Map(HashMap<String, T>),
        List(Vec<IgnoredAny>),
    }

    Ok(match MapOrList::<T>::deserialize(deserializer)? {
        MapOrList::Map(map) => map,
        MapOrList::List(_) => HashMap::new(),
    })
}

impl From<RawSnak> for ClaimValue {
    fn from(snak: RawSnak) -> Self {
        match snak.snaktype.as_str() {
            "novalue" => ClaimValue::NoValue,
            "somevalue" => ClaimValue::SomeValue,
            "value" => match snak.datavalue {
                Some(dv) if dv.kind == "wikibase-entityid" => entity_reference(&dv.value)
                    .map(ClaimValue::EntityReference)
                    .unwrap_or(ClaimValue::Unresolved),
                _ => ClaimValue::Unresolved,
            },
            _ => ClaimValue::Unresolved,
        }
    }
}

fn entity_reference(value: &serde_json::Value) -> Option<String> {
    if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
        return Some(id.to_string());
    }
    // Older dumps only carry the numeric form.
    let numeric = value.get("numeric-id").and_then(|v| v.as_u64())?;
    match value.get("entity-type").and_then(|v| v.as_str()) {
        Some("item") | None => Some(format!("Q{}", numeric)),
        Some("property") => Some(format!("P{}", numeric)),
        Some(_) => None,
    }
}

impl From<RawEntity> for Entity {
    fn from(raw: RawEntity) -> Self {
        let claims = raw
            .claims
            .into_iter()
            .map(|(property, statements)| {
                let values = statements
                    .into_iter()
                    .map(|s| ClaimValue::from(s.mainsnak))
                    .collect();
                (property, values)
            })
            .collect();
        let labels = raw
            .labels
            .into_iter()
            .map(|(language, label)| (language, label.value))
            .collect();
        Entity {
            id: raw.id,
            claims,
            labels,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
