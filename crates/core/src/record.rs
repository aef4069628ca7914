//! Entity records
//!
//! A [`Record`] is one row / document of an entity: a map from persisted
//! property name to [`Value`]. Backends produce records on read and consume
//! them on write; the caching layer stores them without interpreting them.

use crate::criterion::Criteria;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entity instance as seen by the data layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Assign a field, returning the previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Field value, if present
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value, `Null` when absent
    pub fn column(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Values of the given columns, in order (absent columns are `Null`)
    pub fn key_of(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.column(c)).collect()
    }

    /// True if every criterion equals the corresponding field
    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria
            .iter()
            .all(|c| self.get(c.name()).unwrap_or(&Value::Null) == c.value())
    }

    /// Iterate fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
