//! Set backed by one stored set key.

use serde::{Serialize, Serializer};
use std::sync::OnceLock;

use super::{combine, serialize_members, ComputedSet, ObjectSet, SetContext, SetExpr, SetOperation};
use crate::error::Result;
use crate::store::Batch;

/// Handle on a set already materialized in the store.
#[derive(Debug, Clone)]
pub struct StoredSet {
    context: SetContext,
    key: String,
    members: OnceLock<Vec<String>>,
}

impl StoredSet {
    /// Creates a handle on the set stored at `key`.
    #[must_use]
    pub fn new(context: SetContext, key: impl Into<String>) -> Self {
        Self {
            context,
            key: key.into(),
            members: OnceLock::new(),
        }
    }

    /// Key of the backing set.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true once the members have been loaded into memory.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.members.get().is_some()
    }

    /// UNION with `other`.
    pub fn union(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Union, self.into(), other.into())
    }

    /// INTERSECTION with `other`.
    pub fn intersect(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Intersection, self.into(), other.into())
    }
}

impl ObjectSet for StoredSet {
    fn context(&self) -> &SetContext {
        &self.context
    }

    fn count(&self) -> Result<usize> {
        match self.members.get() {
            Some(members) => Ok(members.len()),
            None => self.context.store().scard(&self.key),
        }
    }

    fn object_ids(&self) -> Result<&[String]> {
        if let Some(members) = self.members.get() {
            return Ok(members);
        }
        let loaded = self.context.store().smembers(&self.key)?;
        Ok(self.members.get_or_init(|| loaded))
    }

    fn has_object(&self, object_id: &str) -> Result<bool> {
        match self.members.get() {
            Some(members) => Ok(members.iter().any(|m| m == object_id)),
            None => self.context.store().sismember(&self.key, object_id),
        }
    }

    fn initialize_for_calculation(&self, _batch: &mut Batch) -> Result<String> {
        // Already materialized: contributes no commands
        Ok(self.key.clone())
    }
}

impl Serialize for StoredSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_members(self, serializer)
    }
}
