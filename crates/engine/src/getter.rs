//! Data getter and filter facade
//!
//! Entry point for reads: a [`DataGetter`] is bound to one entity and one
//! reading repository, so callers only supply criteria.
//!
//! ```ignore
//! let french = ctx.get::<Customer>()?
//!     .filter()
//!     .eq("country", "FR")
//!     .eq("active", true)
//!     .read()?;
//! ```

use std::sync::Arc;

use dataaccess_core::{Criteria, Criterion, DataError, DataResult, EntityInfo, Record, Value};

use crate::reading::{Entities, ReadingRepository};

/// Read access to one entity
#[derive(Clone)]
pub struct DataGetter {
    info: Arc<EntityInfo>,
    reader: Arc<dyn ReadingRepository>,
}

impl DataGetter {
    /// Getter for `info` reading through `reader`
    pub fn new(info: Arc<EntityInfo>, reader: Arc<dyn ReadingRepository>) -> Self {
        Self { info, reader }
    }

    /// Metadata of the bound entity
    pub fn info(&self) -> &EntityInfo {
        &self.info
    }

    /// Every record of the entity
    pub fn all(&self) -> DataResult<Entities> {
        self.reader.read(&self.info, &Criteria::new())
    }

    /// Records matching `criteria`
    pub fn where_(&self, criteria: &Criteria) -> DataResult<Entities> {
        self.check(criteria)?;
        self.reader.read(&self.info, criteria)
    }

    /// One column of the records matching `criteria`
    pub fn select(&self, column: &str, criteria: &Criteria) -> DataResult<Vec<Value>> {
        self.check(criteria)?;
        self.check_name(column)?;
        self.reader.read_column(column, &self.info, criteria)
    }

    /// Whether any record matches `criteria`
    pub fn any(&self, criteria: &Criteria) -> DataResult<bool> {
        self.check(criteria)?;
        self.reader.any(&self.info, criteria)
    }

    /// Number of records matching `criteria`
    pub fn count_of(&self, criteria: &Criteria) -> DataResult<usize> {
        self.check(criteria)?;
        self.reader.count_of(&self.info, criteria)
    }

    /// First record matching `criteria`, in backend order
    pub fn first(&self, criteria: &Criteria) -> DataResult<Option<Record>> {
        Ok(self.where_(criteria)?.first().cloned())
    }

    /// Start a fluent filter
    pub fn filter(&self) -> Filter<'_> {
        Filter {
            getter: self,
            criteria: Criteria::new(),
        }
    }

    fn check(&self, criteria: &Criteria) -> DataResult<()> {
        criteria.iter().try_for_each(|c| self.check_name(c.name()))
    }

    // Entities declaring no properties accept any name.
    fn check_name(&self, name: &str) -> DataResult<()> {
        if self.info.properties().is_empty() || self.info.has_property(name) {
            Ok(())
        } else {
            Err(DataError::configuration(format!(
                "entity '{}' has no property '{}'",
                self.info.name(),
                name
            )))
        }
    }
}

impl std::fmt::Debug for DataGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGetter")
            .field("entity", &self.info.name())
            .finish_non_exhaustive()
    }
}

/// Criteria under construction for one [`DataGetter`]
#[derive(Debug)]
pub struct Filter<'a> {
    getter: &'a DataGetter,
    criteria: Criteria,
}

impl<'a> Filter<'a> {
    /// Require `name` to equal `value`; a later call on the same name wins
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push(Criterion::new(name, value));
        self
    }

    /// Add a prebuilt criterion
    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Criteria collected so far
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Matching records
    pub fn read(&self) -> DataResult<Entities> {
        self.getter.where_(&self.criteria)
    }

    /// One column of the matching records
    pub fn select(&self, column: &str) -> DataResult<Vec<Value>> {
        self.getter.select(column, &self.criteria)
    }

    /// Whether any record matches
    pub fn any(&self) -> DataResult<bool> {
        self.getter.any(&self.criteria)
    }

    /// Number of matching records
    pub fn count_of(&self) -> DataResult<usize> {
        self.getter.count_of(&self.criteria)
    }

    /// First matching record
    pub fn first(&self) -> DataResult<Option<Record>> {
        self.getter.first(&self.criteria)
    }
}
