//! Lazy set algebra over stored sets.
//!
//! A set expression is a tree of [`SetExpr`] nodes: leaves are
//! [`StoredSet`]s backed by one remote set key, inner nodes are
//! [`ComputedSet`]s (UNION or INTERSECTION of their children).
//!
//! Evaluating a computed set never costs one round trip per level. Every
//! nested computed child appends its `*STORE` + `EXPIRE` commands to one
//! shared [`Batch`] and hands back the temporary key it will occupy; the
//! root then appends its own non-destructive `SUNION`/`SINTER` over the
//! child keys and the whole batch is submitted once.
//!
//! ```rust,ignore
//! let dinner = group.get_index_filter_set("recipe", "dinner");
//! let dessert = group.get_index_filter_set("recipe", "dessert");
//! let either = dinner.union(dessert)?;
//! let ids = either.object_ids()?; // one pipeline
//! ```

mod computed;
mod ephemeral;
mod stored;

pub use computed::{ComputedSet, SetOperation};
pub use ephemeral::EphemeralSet;
pub use stored::StoredSet;

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::keys::Namespace;
use crate::store::{Batch, Store};

/// Seconds before a temporary calculation key expires.
pub const TEMPORARY_KEY_TTL: u64 = 180;

/// Store connection and key namespace a set is bound to.
#[derive(Clone)]
pub struct SetContext {
    store: Arc<dyn Store>,
    namespace: Namespace,
    temporary_key_ttl: u64,
}

impl fmt::Debug for SetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetContext")
            .field("namespace", &self.namespace)
            .field("temporary_key_ttl", &self.temporary_key_ttl)
            .finish_non_exhaustive()
    }
}

impl SetContext {
    /// Binds sets to `store` within `namespace`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, namespace: Namespace) -> Self {
        Self {
            store,
            namespace,
            temporary_key_ttl: TEMPORARY_KEY_TTL,
        }
    }

    /// Overrides the safety-net TTL of temporary calculation keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for 0: `EXPIRE key 0` would delete
    /// each temporary key before its parent reads it.
    pub fn with_temporary_key_ttl(mut self, ttl_secs: u64) -> Result<Self> {
        if ttl_secs == 0 {
            return Err(Error::InvalidArgument(
                "temporary key TTL must be greater than 0".to_string(),
            ));
        }
        self.temporary_key_ttl = ttl_secs;
        Ok(self)
    }

    /// Same store and TTL, keys generated in `namespace`.
    #[must_use]
    pub(crate) fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Store the sets read from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Namespace used for generated keys.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// TTL applied to temporary calculation keys, in seconds.
    #[must_use]
    pub fn temporary_key_ttl(&self) -> u64 {
        self.temporary_key_ttl
    }

    /// Returns true if sets of both contexts can be combined: same store
    /// instance and same tenant root.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && self.namespace.root() == other.namespace.root()
    }

    pub(crate) fn ensure_compatible(&self, other: &Self) -> Result<()> {
        if !Arc::ptr_eq(&self.store, &other.store) {
            return Err(Error::InvalidSet("set doesn't share the store connection".to_string()));
        }
        if self.namespace.root() != other.namespace.root() {
            return Err(Error::InvalidSet(format!(
                "set belongs to namespace '{}', expected '{}'",
                other.namespace.root(),
                self.namespace.root()
            )));
        }
        Ok(())
    }
}

/// Capabilities shared by every set.
pub trait ObjectSet {
    /// Context the set is bound to.
    fn context(&self) -> &SetContext;

    /// Number of members.
    fn count(&self) -> Result<usize>;

    /// Members, loaded on first access and memoized.
    fn object_ids(&self) -> Result<&[String]>;

    /// Membership test.
    fn has_object(&self, object_id: &str) -> Result<bool>;

    /// Prepares the set to take part in a parent's calculation.
    ///
    /// Appends whatever commands are needed to `batch` and returns the key
    /// holding this set's members once the batch has executed.
    fn initialize_for_calculation(&self, batch: &mut Batch) -> Result<String>;

    /// Iterates members. The first call loads them; later calls reuse the cache.
    fn iter(&self) -> Result<std::slice::Iter<'_, String>> {
        Ok(self.object_ids()?.iter())
    }
}

/// Node of a set expression tree.
#[derive(Debug, Clone)]
pub enum SetExpr {
    /// Leaf backed by a stored set key.
    Stored(StoredSet),
    /// UNION or INTERSECTION of child expressions.
    Computed(ComputedSet),
}

impl SetExpr {
    /// UNION of this expression with `other`.
    pub fn union(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Union, self, other.into())
    }

    /// INTERSECTION of this expression with `other`.
    pub fn intersect(self, other: impl Into<SetExpr>) -> Result<ComputedSet> {
        combine(SetOperation::Intersection, self, other.into())
    }
}

pub(crate) fn combine(
    operation: SetOperation,
    first: SetExpr,
    second: SetExpr,
) -> Result<ComputedSet> {
    let mut computed = ComputedSet::new(first.context().clone(), operation);
    computed.add_set(first)?;
    computed.add_set(second)?;
    Ok(computed)
}

impl From<StoredSet> for SetExpr {
    fn from(set: StoredSet) -> Self {
        Self::Stored(set)
    }
}

impl From<ComputedSet> for SetExpr {
    fn from(set: ComputedSet) -> Self {
        Self::Computed(set)
    }
}

impl ObjectSet for SetExpr {
    fn context(&self) -> &SetContext {
        match self {
            Self::Stored(set) => set.context(),
            Self::Computed(set) => set.context(),
        }
    }

    fn count(&self) -> Result<usize> {
        match self {
            Self::Stored(set) => set.count(),
            Self::Computed(set) => set.count(),
        }
    }

    fn object_ids(&self) -> Result<&[String]> {
        match self {
            Self::Stored(set) => set.object_ids(),
            Self::Computed(set) => set.object_ids(),
        }
    }

    fn has_object(&self, object_id: &str) -> Result<bool> {
        match self {
            Self::Stored(set) => set.has_object(object_id),
            Self::Computed(set) => set.has_object(object_id),
        }
    }

    fn initialize_for_calculation(&self, batch: &mut Batch) -> Result<String> {
        match self {
            Self::Stored(set) => set.initialize_for_calculation(batch),
            Self::Computed(set) => set.initialize_for_calculation(batch),
        }
    }
}

impl Serialize for SetExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_members(self, serializer)
    }
}

/// Serializes a set as the JSON array of its members, loading them if needed.
pub(crate) fn serialize_members<T, S>(
    set: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    T: ObjectSet + ?Sized,
    S: Serializer,
{
    let ids = set.object_ids().map_err(serde::ser::Error::custom)?;
    ids.serialize(serializer)
}
