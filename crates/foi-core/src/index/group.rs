//! Index group: mutation protocol, membership reads, and query compilation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::codec::{decode_filters, encode_filters};
use super::lock::{LockWait, ObjectLock};
use super::IndexGroupOptions;
use crate::error::{Error, Result};
use crate::keys::Namespace;
use crate::query::FilterQuery;
use crate::set::{ComputedSet, SetContext, SetExpr, SetOperation, StoredSet};
use crate::store::{Batch, Clock, Command, Store, SystemClock};

/// Alias of the result command in a direct query batch.
const QUERY_RESULT_ALIAS: &str = "objectIds";

/// A group of related filtered object indexes sharing one store and key
/// namespace.
///
/// Every mutation takes the object's lock, reads the current index map,
/// and applies all derived changes in one transaction.
///
/// # Example
///
/// ```rust,ignore
/// let group = IndexGroup::new("food", store, IndexGroupOptions::default())?;
/// group.add_object_to_index("salt", "recipe", ["dinner", "dessert"], LockWait::default())?;
/// assert!(group.is_object_in_index("salt", "recipe")?);
/// ```
#[derive(Clone)]
pub struct IndexGroup {
    name: String,
    namespace: Namespace,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    options: IndexGroupOptions,
    context: SetContext,
}

impl fmt::Debug for IndexGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexGroup")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl IndexGroup {
    /// Creates an index group without tenant namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty or contains
    /// `:` or `*`, or if the lock TTL or the temporary key TTL is zero.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        options: IndexGroupOptions,
    ) -> Result<Self> {
        let name = name.into();
        validate_group_name(&name)?;
        if options.object_lock_ttl == 0 {
            return Err(Error::InvalidArgument(
                "object lock TTL must be greater than 0".to_string(),
            ));
        }
        let namespace = Namespace::new(name.clone(), None::<String>);
        let context = SetContext::new(store.clone(), namespace.clone())
            .with_temporary_key_ttl(options.temporary_key_ttl)?;
        Ok(Self {
            name,
            namespace,
            store,
            clock: Arc::new(SystemClock),
            options,
            context,
        })
    }

    /// Scopes every key of the group under `tenant`.
    #[must_use]
    pub fn with_tenant(mut self, tenant: Option<impl Into<String>>) -> Self {
        self.namespace = Namespace::new(self.name.clone(), tenant);
        self.context = self.context.with_namespace(self.namespace.clone());
        self
    }

    /// Replaces the clock driving lock waits.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key namespace of the group.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Group options.
    #[must_use]
    pub fn options(&self) -> &IndexGroupOptions {
        &self.options
    }

    /// Store the group writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Context of the sets built by this group.
    #[must_use]
    pub fn set_context(&self) -> &SetContext {
        &self.context
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds the object to `index` with `filters`, replacing any filters it
    /// already had there.
    ///
    /// # Errors
    ///
    /// [`Error::LockedObject`] if the lock is not acquired within `wait`.
    pub fn add_object_to_index<I, S>(
        &self,
        object_id: &str,
        index: &str,
        filters: I,
        wait: LockWait,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filters = collect_filters(filters);
        self.with_object_lock(object_id, wait, || {
            let mut transaction = Vec::new();
            if let Some(previous) = self.inspect_object_in_index(object_id, index)? {
                self.deindex_object(object_id, index, &previous, &mut transaction);
            }
            self.index_object(object_id, index, &filters, &mut transaction);
            self.store.transaction(&transaction)?;
            debug!(group = %self.name, object_id, index, filters = filters.len(), "Indexed object");
            Ok(())
        })
    }

    /// Removes the object from `index`.
    ///
    /// Returns false, without writing anything, if it was not there.
    pub fn remove_object_from_index(
        &self,
        object_id: &str,
        index: &str,
        wait: LockWait,
    ) -> Result<bool> {
        self.with_object_lock(object_id, wait, || {
            let Some(previous) = self.inspect_object_in_index(object_id, index)? else {
                return Ok(false);
            };
            let mut transaction = Vec::new();
            self.deindex_object(object_id, index, &previous, &mut transaction);
            self.store.transaction(&transaction)?;
            debug!(group = %self.name, object_id, index, "Removed object from index");
            Ok(true)
        })
    }

    /// Removes the object from every index of the group.
    ///
    /// Returns the indexes it was removed from, empty if none.
    pub fn remove_object_from_all_indexes(
        &self,
        object_id: &str,
        wait: LockWait,
    ) -> Result<Vec<String>> {
        self.with_object_lock(object_id, wait, || {
            let memberships = self.inspect_object(object_id)?;
            if memberships.is_empty() {
                return Ok(Vec::new());
            }
            let mut transaction = Vec::new();
            for (index, filters) in &memberships {
                self.deindex_object(object_id, index, filters, &mut transaction);
            }
            self.store.transaction(&transaction)?;
            debug!(
                group = %self.name,
                object_id,
                indexes = memberships.len(),
                "Removed object from all indexes"
            );
            Ok(memberships.into_keys().collect())
        })
    }

    /// Makes `index` the only index holding the object, with `filters`.
    ///
    /// Returns the indexes the object was removed from, never including
    /// `index` itself.
    pub fn move_object_to_index<I, S>(
        &self,
        object_id: &str,
        index: &str,
        filters: I,
        wait: LockWait,
    ) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filters = collect_filters(filters);
        self.with_object_lock(object_id, wait, || {
            let memberships = self.inspect_object(object_id)?;
            let mut transaction = Vec::new();
            for (previous_index, previous_filters) in &memberships {
                self.deindex_object(object_id, previous_index, previous_filters, &mut transaction);
            }
            self.index_object(object_id, index, &filters, &mut transaction);
            self.store.transaction(&transaction)?;
            let removed: Vec<String> = memberships
                .into_keys()
                .filter(|previous_index| previous_index != index)
                .collect();
            debug!(group = %self.name, object_id, index, removed = removed.len(), "Moved object");
            Ok(removed)
        })
    }

    /// Deletes every key of `index`. Not coordinated with object locks.
    ///
    /// Object index maps keep their entry for the index; they are rewritten
    /// or cleared by the next mutation of each object.
    pub fn flush_index(&self, index: &str) -> Result<u64> {
        let keys = self.store.scan_keys(&self.namespace.index_pattern(index))?;
        let deleted = self.store.del(keys)?;
        info!(group = %self.name, index, deleted, "Flushed index");
        Ok(deleted)
    }

    /// Deletes every key of the group. Not coordinated with object locks.
    pub fn flush_all_indexes(&self) -> Result<u64> {
        let keys = self.store.scan_keys(&self.namespace.group_pattern())?;
        let deleted = self.store.del(keys)?;
        info!(group = %self.name, deleted, "Flushed all indexes");
        Ok(deleted)
    }

    // =========================================================================
    // Membership reads (unlocked, point in time)
    // =========================================================================

    /// Returns true if the object is in `index`.
    pub fn is_object_in_index(&self, object_id: &str, index: &str) -> Result<bool> {
        self.store
            .hexists(&self.namespace.object_index_map_key(object_id), index)
    }

    /// Indexes holding the object, sorted.
    pub fn get_indexes_with_object(&self, object_id: &str) -> Result<Vec<String>> {
        let mut indexes = self
            .store
            .hkeys(&self.namespace.object_index_map_key(object_id))?;
        indexes.sort_unstable();
        Ok(indexes)
    }

    /// Filters the object carries in `index`, or `None` if it is not there.
    pub fn get_object_filters(&self, object_id: &str, index: &str) -> Result<Option<Vec<String>>> {
        self.inspect_object_in_index(object_id, index)
    }

    /// Number of objects in `index`.
    pub fn count_objects_in_index(&self, index: &str) -> Result<usize> {
        self.store.scard(&self.namespace.index_global_set_key(index))
    }

    // =========================================================================
    // Sets and queries
    // =========================================================================

    /// Set of every object in `index`.
    #[must_use]
    pub fn get_index_global_set(&self, index: &str) -> StoredSet {
        StoredSet::new(self.context.clone(), self.namespace.index_global_set_key(index))
    }

    /// Set of the objects in `index` tagged with `filter`.
    #[must_use]
    pub fn get_index_filter_set(&self, index: &str, filter: &str) -> StoredSet {
        StoredSet::new(
            self.context.clone(),
            self.namespace.index_filter_set_key(index, filter),
        )
    }

    /// Empty UNION bound to this group.
    #[must_use]
    pub fn create_union(&self) -> ComputedSet {
        ComputedSet::new(self.context.clone(), SetOperation::Union)
    }

    /// Empty INTERSECTION bound to this group.
    #[must_use]
    pub fn create_intersection(&self) -> ComputedSet {
        ComputedSet::new(self.context.clone(), SetOperation::Intersection)
    }

    /// UNION of the filter sets of `index`.
    pub fn create_union_of_index_filters<S: AsRef<str>>(
        &self,
        index: &str,
        filters: &[S],
    ) -> Result<ComputedSet> {
        self.filter_sets(SetOperation::Union, index, filters)
    }

    /// INTERSECTION of the filter sets of `index`.
    pub fn create_intersection_of_index_filters<S: AsRef<str>>(
        &self,
        index: &str,
        filters: &[S],
    ) -> Result<ComputedSet> {
        self.filter_sets(SetOperation::Intersection, index, filters)
    }

    /// Compiles `query` into a lazy set expression over `index`.
    ///
    /// - no group: the global set of the index
    /// - one group: UNION of its filter sets
    /// - several groups: INTERSECTION of one child per group, the filter set
    ///   itself for single-filter groups and a UNION otherwise
    pub fn create_set_for_query(&self, index: &str, query: &FilterQuery) -> Result<SetExpr> {
        match query.groups() {
            [] => Ok(self.get_index_global_set(index).into()),
            [filters] => Ok(self.create_union_of_index_filters(index, filters)?.into()),
            groups => {
                let mut intersection = self.create_intersection();
                for filters in groups {
                    match filters.as_slice() {
                        [filter] => {
                            intersection.add_set(self.get_index_filter_set(index, filter))?
                        }
                        _ => intersection
                            .add_set(self.create_union_of_index_filters(index, filters)?)?,
                    };
                }
                Ok(intersection.into())
            }
        }
    }

    /// Evaluates `query` over `index` immediately, in one exchange.
    ///
    /// Multi-filter groups are unioned into throwaway keys, intersected,
    /// and the throwaway keys deleted, all in the same pipeline.
    pub fn get_objects_in_index(&self, index: &str, query: &FilterQuery) -> Result<Vec<String>> {
        match query.groups() {
            [] => self
                .store
                .scan_members(&self.namespace.index_global_set_key(index)),
            [filters] => {
                let command = SetOperation::Union.calculate(self.filter_keys(index, filters));
                self.store.execute(&command)?.into_members(command.name())
            }
            groups => {
                let mut batch = Batch::new();
                let mut throwaway = Vec::new();
                let mut keys = Vec::with_capacity(groups.len());
                for filters in groups {
                    match filters.as_slice() {
                        [filter] => keys.push(self.namespace.index_filter_set_key(index, filter)),
                        _ => {
                            let key = self.namespace.temporary_key();
                            batch.push(SetOperation::Union.calculate_and_store(
                                key.clone(),
                                self.filter_keys(index, filters),
                            ));
                            batch.push(Command::Expire {
                                key: key.clone(),
                                seconds: self.options.temporary_key_ttl,
                            });
                            keys.push(key.clone());
                            throwaway.push(key);
                        }
                    }
                }
                batch.push_as(QUERY_RESULT_ALIAS, SetOperation::Intersection.calculate(keys));
                if !throwaway.is_empty() {
                    batch.push(Command::Del { keys: throwaway });
                }
                let mut reply = self.store.run_batch(batch, false)?;
                reply
                    .take(QUERY_RESULT_ALIAS)?
                    .into_members(SetOperation::Intersection.calculate_name())
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn with_object_lock<R>(
        &self,
        object_id: &str,
        wait: LockWait,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let lock = ObjectLock::acquire(
            self.store.clone(),
            self.clock.as_ref(),
            self.namespace.object_lock_key(object_id),
            object_id,
            self.options.object_lock_ttl,
            wait,
            self.options.lock_poll_interval,
        )?;
        let outcome = f();
        let released = lock.release();
        let value = outcome?;
        released?;
        Ok(value)
    }

    fn inspect_object_in_index(&self, object_id: &str, index: &str) -> Result<Option<Vec<String>>> {
        let key = self.namespace.object_index_map_key(object_id);
        self.store
            .hget(&key, index)?
            .map(|encoded| decode_filters(&key, index, &encoded))
            .transpose()
    }

    fn inspect_object(&self, object_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let key = self.namespace.object_index_map_key(object_id);
        self.store
            .hgetall(&key)?
            .into_iter()
            .map(|(index, encoded)| {
                let filters = decode_filters(&key, &index, &encoded)?;
                Ok((index, filters))
            })
            .collect()
    }

    fn index_object(
        &self,
        object_id: &str,
        index: &str,
        filters: &[String],
        transaction: &mut Vec<Command>,
    ) {
        transaction.push(Command::HSet {
            key: self.namespace.object_index_map_key(object_id),
            field: index.to_string(),
            value: encode_filters(filters),
        });
        transaction.push(Command::SAdd {
            key: self.namespace.index_global_set_key(index),
            members: vec![object_id.to_string()],
        });
        for filter in filters {
            transaction.push(Command::SAdd {
                key: self.namespace.index_filter_set_key(index, filter),
                members: vec![object_id.to_string()],
            });
        }
    }

    fn deindex_object(
        &self,
        object_id: &str,
        index: &str,
        filters: &[String],
        transaction: &mut Vec<Command>,
    ) {
        transaction.push(Command::HDel {
            key: self.namespace.object_index_map_key(object_id),
            field: index.to_string(),
        });
        transaction.push(Command::SRem {
            key: self.namespace.index_global_set_key(index),
            members: vec![object_id.to_string()],
        });
        for filter in filters {
            transaction.push(Command::SRem {
                key: self.namespace.index_filter_set_key(index, filter),
                members: vec![object_id.to_string()],
            });
        }
    }

    fn filter_keys<S: AsRef<str>>(&self, index: &str, filters: &[S]) -> Vec<String> {
        filters
            .iter()
            .map(|filter| self.namespace.index_filter_set_key(index, filter.as_ref()))
            .collect()
    }

    fn filter_sets<S: AsRef<str>>(
        &self,
        operation: SetOperation,
        index: &str,
        filters: &[S],
    ) -> Result<ComputedSet> {
        let mut set = ComputedSet::new(self.context.clone(), operation);
        for filter in filters {
            set.add_set(self.get_index_filter_set(index, filter.as_ref()))?;
        }
        Ok(set)
    }
}

/// Collects filters, dropping repeats but keeping first-seen order.
fn collect_filters<I, S>(filters: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for filter in filters {
        let filter = filter.into();
        if !unique.contains(&filter) {
            unique.push(filter);
        }
    }
    unique
}

/// Rejects names that would break the key layout or scan patterns.
pub(crate) fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("index group name must not be empty".to_string()));
    }
    if name.contains([':', '*']) {
        return Err(Error::InvalidArgument(format!(
            "index group name '{name}' must not contain ':' or '*'"
        )));
    }
    Ok(())
}
