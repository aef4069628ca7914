//! Entity metadata and its registry
//!
//! Every entity type is described once by an [`EntityInfo`]: its logical
//! name, the repository that stores it, how long its result sets may be
//! cached, its persisted properties and its key declarations.
//!
//! Metadata is declared explicitly through [`Entity::describe`] (or
//! registered by name) and memoized in an [`EntityRegistry`] owned by the
//! caller's session. Infos are immutable once registered and shared through
//! `Arc`.

use crate::error::{DataError, DataResult};
use crate::record::Record;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::sync::Arc;
use std::time::Duration;

/// Key declared on an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDeclaration {
    /// Primary key columns
    Primary {
        /// Columns forming the key, in order
        columns: Vec<String>,
    },
    /// Foreign key referencing another entity
    Foreign {
        /// Constraint name
        name: String,
        /// Local columns
        columns: Vec<String>,
        /// Referenced entity name
        references: String,
    },
    /// Secondary (non-unique lookup) key
    Secondary {
        /// Index name
        name: String,
        /// Indexed columns
        columns: Vec<String>,
    },
}

impl KeyDeclaration {
    /// Columns covered by this key
    pub fn columns(&self) -> &[String] {
        match self {
            KeyDeclaration::Primary { columns }
            | KeyDeclaration::Foreign { columns, .. }
            | KeyDeclaration::Secondary { columns, .. } => columns,
        }
    }
}

/// Static metadata for one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    name: String,
    repository: String,
    uses_queries: bool,
    cache_timeout: Duration,
    properties: Vec<String>,
    keys: Vec<KeyDeclaration>,
}

impl EntityInfo {
    /// Start describing an entity
    pub fn builder(name: impl Into<String>) -> EntityInfoBuilder {
        EntityInfoBuilder::new(name)
    }

    /// Logical entity name (table, collection, procedure prefix)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the repository capability that stores this entity
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Whether the backend reads this entity through ad-hoc queries
    /// rather than stored procedures
    pub fn uses_queries(&self) -> bool {
        self.uses_queries
    }

    /// How long a cached result set stays fresh; zero disables caching
    pub fn cache_timeout(&self) -> Duration {
        self.cache_timeout
    }

    /// Persisted property names
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Declared keys
    pub fn keys(&self) -> &[KeyDeclaration] {
        &self.keys
    }

    /// Primary key columns, if one was declared
    pub fn primary_key(&self) -> Option<&[String]> {
        self.keys.iter().find_map(|k| match k {
            KeyDeclaration::Primary { columns } => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// True if `name` is a persisted property
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    /// Copy of this info with a different cache timeout
    pub fn with_cache_timeout(&self, cache_timeout: Duration) -> Self {
        Self {
            cache_timeout,
            ..self.clone()
        }
    }
}

/// Builder for [`EntityInfo`]
#[derive(Debug, Clone)]
pub struct EntityInfoBuilder {
    info: EntityInfo,
}

impl EntityInfoBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            info: EntityInfo {
                name: name.into(),
                repository: String::new(),
                uses_queries: true,
                cache_timeout: Duration::ZERO,
                properties: Vec::new(),
                keys: Vec::new(),
            },
        }
    }

    /// Repository capability that stores the entity
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.info.repository = repository.into();
        self
    }

    /// Read through stored procedures instead of queries
    pub fn uses_procedures(mut self) -> Self {
        self.info.uses_queries = false;
        self
    }

    /// Cache result sets for `timeout`
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.info.cache_timeout = timeout;
        self
    }

    /// Add a persisted property
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.info.properties.push(name.into());
        self
    }

    /// Add several persisted properties
    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.info.properties.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare the primary key
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.info.keys.push(KeyDeclaration::Primary {
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declare any other key
    pub fn key(mut self, key: KeyDeclaration) -> Self {
        self.info.keys.push(key);
        self
    }

    /// Validate and finish
    ///
    /// # Errors
    ///
    /// `Configuration` if the name or repository is empty, or more than one
    /// primary key was declared.
    pub fn build(self) -> DataResult<EntityInfo> {
        let info = self.info;
        if info.name.trim().is_empty() {
            return Err(DataError::configuration("entity name must not be empty"));
        }
        if info.repository.trim().is_empty() {
            return Err(DataError::configuration(format!(
                "entity '{}' does not name a repository",
                info.name
            )));
        }
        let primaries = info
            .keys
            .iter()
            .filter(|k| matches!(k, KeyDeclaration::Primary { .. }))
            .count();
        if primaries > 1 {
            return Err(DataError::configuration(format!(
                "entity '{}' declares {} primary keys",
                info.name, primaries
            )));
        }
        Ok(info)
    }
}

/// A Rust type that maps onto a stored entity
pub trait Entity: 'static {
    /// Describe the entity's metadata
    ///
    /// Called at most once per registry; the result is memoized.
    fn describe() -> DataResult<EntityInfo>;

    /// Convert to a record for writing
    fn to_record(&self) -> Record;
}

/// Memoized entity metadata, keyed by type and by name
///
/// Cache-timeout overrides (typically from configuration) are applied when an
/// info is first memoized. An entity declaring no timeout gets the registry
/// default, unless an explicit override names it.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_type: DashMap<TypeId, Arc<EntityInfo>>,
    by_name: DashMap<String, Arc<EntityInfo>>,
    timeout_overrides: DashMap<String, Duration>,
    default_timeout: RwLock<Duration>,
}

impl EntityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cache timeout of an entity registered later
    pub fn override_cache_timeout(&self, entity: impl Into<String>, timeout: Duration) {
        self.timeout_overrides.insert(entity.into(), timeout);
    }

    /// Timeout for entities registered later that declare none
    pub fn set_default_cache_timeout(&self, timeout: Duration) {
        *self.default_timeout.write() = timeout;
    }

    /// Metadata for `E`, describing it on first use
    pub fn info_for<E: Entity>(&self) -> DataResult<Arc<EntityInfo>> {
        let type_id = TypeId::of::<E>();
        if let Some(info) = self.by_type.get(&type_id) {
            return Ok(Arc::clone(info.value()));
        }

        let described = E::describe().map_err(|e| match e {
            DataError::Configuration(msg) => {
                DataError::Configuration(format!("{} ({})", msg, type_name::<E>()))
            }
            other => other,
        })?;
        let info = self.apply_override(described);

        // Another thread may have described E meanwhile; adopt its result.
        let info = Arc::clone(self.by_type.entry(type_id).or_insert(info).value());
        self.by_name
            .entry(info.name().to_string())
            .or_insert_with(|| Arc::clone(&info));
        Ok(info)
    }

    /// Register metadata for an entity that has no Rust type
    ///
    /// # Errors
    ///
    /// `Configuration` if an entity with the same name is already registered.
    pub fn register(&self, info: EntityInfo) -> DataResult<Arc<EntityInfo>> {
        let info = self.apply_override(info);
        match self.by_name.entry(info.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DataError::configuration(format!(
                "entity '{}' is already registered",
                info.name()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(info).value())),
        }
    }

    /// Metadata by entity name
    ///
    /// # Errors
    ///
    /// `Configuration` if no entity of that name is known.
    pub fn by_name(&self, name: &str) -> DataResult<Arc<EntityInfo>> {
        self.by_name
            .get(name)
            .map(|info| Arc::clone(info.value()))
            .ok_or_else(|| DataError::configuration(format!("unknown entity '{}'", name)))
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn apply_override(&self, info: EntityInfo) -> Arc<EntityInfo> {
        if let Some(timeout) = self.timeout_overrides.get(info.name()) {
            return Arc::new(info.with_cache_timeout(*timeout.value()));
        }
        let default_timeout = *self.default_timeout.read();
        if info.cache_timeout().is_zero() && !default_timeout.is_zero() {
            return Arc::new(info.with_cache_timeout(default_timeout));
        }
        Arc::new(info)
    }
}
