//! UNION / INTERSECTION sets computed in one batched round trip.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, warn};

use super::{combine, serialize_members, EphemeralSet, ObjectSet, SetContext, SetExpr, StoredSet};
use crate::error::{Error, Result};
use crate::store::{Batch, Command};

/// Alias of the result command in a calculation batch.
const RESULT_ALIAS: &str = "objectIds";

/// Set operation applied to a computed set's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperation {
    /// Members of any child.
    Union,
    /// Members of every child.
    Intersection,
}

impl SetOperation {
    /// Non-destructive form: the result is returned inline.
    #[must_use]
    pub fn calculate(self, keys: Vec<String>) -> Command {
        match self {
            Self::Union => Command::SUnion { keys },
            Self::Intersection => Command::SInter { keys },
        }
    }

    /// Wire verb of the non-destructive form.
    #[must_use]
    pub const fn calculate_name(self) -> &'static str {
        match self {
            Self::Union => "SUNION",
            Self::Intersection => "SINTER",
        }
    }

    /// Destructive form: the result is written to `destination`.
    #[must_use]
    pub fn calculate_and_store(self, destination: String, keys: Vec<String>) -> Command {
        match self {
            Self::Union => Command::SUnionStore { destination, keys },
            Self::Intersection => Command::SInterStore { destination, keys },
        }
    }
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => f.write_str("UNION"),
            Self::Intersection => f.write_str("INTERSECTION"),
        }
    }
}

/// Set whose members are the UNION or INTERSECTION of its included sets.
///
/// Membership is resolved lazily on first access, then cached until the
/// composition changes.
#[derive(Debug, Clone)]
pub struct ComputedSet {
    context: SetContext,
    operation: SetOperation,
    included: Vec<SetExpr>,
    members: OnceLock<Vec<String>>,
}

impl ComputedSet {
    /// Creates an empty computed set.
    #[must_use]
    pub fn new(context: SetContext, operation: SetOperation) -> Self {
        Self {
            context,
            operation,
            included: Vec::new(),
            members: OnceLock::new(),
        }
    }

    /// Creates an empty UNION.
    #[must_use]
    pub fn union_of(context: SetContext) -> Self {
        Self::new(context, SetOperation::Union)
    }

    /// Creates an empty INTERSECTION.
    #[must_use]
    pub fn intersection_of(context: SetContext) -> Self {
        Self::new(context, SetOperation::Intersection)
    }

    /// Operation applied to the included sets.
    #[must_use]
    pub fn operation(&self) -> SetOperation {
        self.operation
    }

    /// Included sets, in insertion order.
    #[must_use]
    pub fn included_sets(&self) -> &[SetExpr] {
        &self.included
    }

    /// Includes `set` in the calculation.
    ///
    /// Fails with [`Error::InvalidSet`] if `set` is bound to another store
    /// or tenant. Any cached membership is discarded.
    pub fn add_set(&mut self, set: impl Into<SetExpr>) -> Result<&mut Self> {
        let set = set.into();
        self.context.ensure_compatible(set.context())?;
        self.included.push(set);
        self.members = OnceLock::new();
        Ok(self)
    }

    /// Builder form of [`ComputedSet::add_set`].
    pub fn with_set(mut self, set: impl Into<SetExpr>) -> Result<Self> {
        self.add_set(set)?;
        Ok(self)
    }

    /// UNION with `other`.
    pub fn union(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Union, self.into(), other.into())
    }

    /// INTERSECTION with `other`.
    pub fn intersect(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Intersection, self.into(), other.into())
    }

    /// Stores the result permanently (no expiry) under `key`, or under a
    /// fresh key in the group namespace.
    pub fn persist(&self, key: Option<&str>) -> Result<StoredSet> {
        let destination = self.destination_key(key);
        let batch = self.calculate_and_store_batch(&destination)?;
        self.context.store().run_batch(batch, false)?;
        debug!(key = %destination, operation = %self.operation, "Persisted computed set");
        Ok(StoredSet::new(self.context.clone(), destination))
    }

    /// Stores the result under `key` (or a fresh key) with an optional TTL
    /// and returns a handle that deletes the key when released.
    pub fn persist_temporary(
        &self,
        key: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<EphemeralSet> {
        let destination = self.destination_key(key);
        let mut batch = self.calculate_and_store_batch(&destination)?;
        if let Some(ttl) = ttl_secs.filter(|&ttl| ttl > 0) {
            batch.push(Command::Expire {
                key: destination.clone(),
                seconds: ttl,
            });
        }
        if let Err(err) = self.context.store().run_batch(batch, false) {
            // The *STORE may have succeeded before the EXPIRE failed
            if let Err(cleanup) = self.context.store().del(vec![destination.clone()]) {
                warn!(key = %destination, error = %cleanup, "Failed to delete temporary set");
            }
            return Err(err);
        }
        Ok(EphemeralSet::new(StoredSet::new(self.context.clone(), destination)))
    }

    /// Materializes the result into a temporary set, runs `f` on it, and
    /// releases the set on every exit path.
    ///
    /// The key carries the context's temporary TTL in case the process dies
    /// before the release.
    pub fn with_temporary<R>(&self, f: impl FnOnce(&EphemeralSet) -> Result<R>) -> Result<R> {
        let set = self.persist_temporary(None, Some(self.context.temporary_key_ttl()))?;
        let outcome = f(&set);
        let released = set.release();
        let value = outcome?;
        released?;
        Ok(value)
    }

    fn destination_key(&self, key: Option<&str>) -> String {
        key.map_or_else(|| self.context.namespace().temporary_key(), str::to_string)
    }

    fn initialize_included_sets(&self, batch: &mut Batch) -> Result<Vec<String>> {
        if self.included.is_empty() {
            return Err(Error::NoIncludedSets);
        }
        self.included
            .iter()
            .map(|set| set.initialize_for_calculation(batch))
            .collect()
    }

    fn calculate_and_store_batch(&self, destination: &str) -> Result<Batch> {
        let mut batch = Batch::new();
        let keys = self.initialize_included_sets(&mut batch)?;
        batch.push(self.operation.calculate_and_store(destination.to_string(), keys));
        Ok(batch)
    }

    fn load(&self) -> Result<Vec<String>> {
        let mut batch = Batch::new();
        let keys = self.initialize_included_sets(&mut batch)?;
        batch.push_as(RESULT_ALIAS, self.operation.calculate(keys));
        let mut reply = self.context.store().run_batch(batch, false)?;
        reply
            .take(RESULT_ALIAS)?
            .into_members(self.operation.calculate_name())
    }
}

impl ObjectSet for ComputedSet {
    fn context(&self) -> &SetContext {
        &self.context
    }

    fn count(&self) -> Result<usize> {
        Ok(self.object_ids()?.len())
    }

    fn object_ids(&self) -> Result<&[String]> {
        if let Some(members) = self.members.get() {
            return Ok(members);
        }
        let loaded = self.load()?;
        Ok(self.members.get_or_init(|| loaded))
    }

    fn has_object(&self, object_id: &str) -> Result<bool> {
        Ok(self.object_ids()?.iter().any(|m| m == object_id))
    }

    fn initialize_for_calculation(&self, batch: &mut Batch) -> Result<String> {
        let destination = self.context.namespace().temporary_key();
        let keys = self.initialize_included_sets(batch)?;
        batch.push(self.operation.calculate_and_store(destination.clone(), keys));
        batch.push(Command::Expire {
            key: destination.clone(),
            seconds: self.context.temporary_key_ttl(),
        });
        Ok(destination)
    }
}

impl Serialize for ComputedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_members(self, serializer)
    }
}
