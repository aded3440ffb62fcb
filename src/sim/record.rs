//! Record Model
//!
//! One timestamped observation for one entity. Measurement fields are an open
//! set keyed by name, each either numeric or categorical.

use crate::sim::clock::{parse_timestamp, Nanos};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Stable identifier of a tracked entity (e.g. one monitored animal).
pub type EntityId = String;

/// A single measurement value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Category(String),
}

impl FieldValue {
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Category(_) => None,
        }
    }

    #[inline]
    pub fn as_category(&self) -> Option<&str> {
        match self {
            FieldValue::Category(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Category(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Category(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(alias = "entityId", alias = "cow_id")]
    pub entity_id: EntityId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Nanos,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(entity_id: impl Into<EntityId>, timestamp: Nanos) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_number)
    }

    pub fn category(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_category)
    }

    /// Copy of this record moved by `delta` nanoseconds.
    pub fn shifted(&self, delta: Nanos) -> Self {
        Self {
            entity_id: self.entity_id.clone(),
            timestamp: self.timestamp + delta,
            fields: self.fields.clone(),
        }
    }
}

/// Accept epoch nanoseconds or a timestamp string read as a wall-clock reading.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Nanos, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NanosOrText {
        Nanos(i64),
        Text(String),
    }

    match NanosOrText::deserialize(deserializer)? {
        NanosOrText::Nanos(n) => Ok(n),
        NanosOrText::Text(s) => parse_timestamp(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {:?}", s))),
    }
}
