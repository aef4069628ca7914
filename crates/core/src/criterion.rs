//! Filter criteria and cache fingerprints
//!
//! A [`Criterion`] is one `column = value` predicate. A [`Criteria`] set is
//! the conjunction of its members and is what every read operation takes.
//!
//! ## Determinism
//!
//! Criteria are kept ordered by name, so two sets holding the same
//! `(name, value)` pairs compare equal and produce the same
//! [`fingerprint`](Criteria::fingerprint) no matter in which order they were
//! built. Adding a criterion whose name is already present replaces it.

use crate::value::{TypeTag, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One filter predicate: `name = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    name: String,
    value: Value,
    type_tag: TypeTag,
}

impl Criterion {
    /// Create a criterion whose type tag is taken from the value
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            type_tag: value.type_tag(),
            value,
        }
    }

    /// Create a criterion with an explicit type tag
    ///
    /// Useful for `Null` parameters that must still bind as a concrete type.
    pub fn typed(name: impl Into<String>, value: impl Into<Value>, type_tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_tag,
        }
    }

    /// Column or parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value to compare against
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Declared type of the value
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }
}

/// A set of criteria, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    items: BTreeMap<String, Criterion>,
}

impl Criteria {
    /// Empty criteria set (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Criterion::new(name, value));
        self
    }

    /// Insert a criterion, replacing any existing one with the same name
    pub fn push(&mut self, criterion: Criterion) {
        self.items.insert(criterion.name.clone(), criterion);
    }

    /// Look up a criterion by name
    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.items.get(name)
    }

    /// Iterate criteria in name order
    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.items.values()
    }

    /// Number of criteria
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no criteria
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cache key for reading `entity_name` with these criteria
    ///
    /// Format: `Entity|"name"=value|"name"=value...` in name order. Names
    /// are quoted and values use the type-distinguishing [`Value`] display,
    /// so distinct criteria can never collapse onto the same key.
    pub fn fingerprint(&self, entity_name: &str) -> String {
        let mut key = String::with_capacity(entity_name.len() + self.items.len() * 16);
        key.push_str(entity_name);
        for criterion in self.items.values() {
            let _ = write!(key, "|{:?}={}", criterion.name, criterion.value);
        }
        key
    }
}

impl FromIterator<Criterion> for Criteria {
    fn from_iter<I: IntoIterator<Item = Criterion>>(iter: I) -> Self {
        let mut criteria = Criteria::new();
        criteria.extend(iter);
        criteria
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, value)| Criterion::new(name, value))
            .collect()
    }
}

impl Extend<Criterion> for Criteria {
    fn extend<I: IntoIterator<Item = Criterion>>(&mut self, iter: I) {
        for criterion in iter {
            self.push(criterion);
        }
    }
}

impl<'a> IntoIterator for &'a Criteria {
    type Item = &'a Criterion;
    type IntoIter = std::collections::btree_map::Values<'a, String, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}
