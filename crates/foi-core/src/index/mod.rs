//! Index groups: per-object locked mutations and membership queries.
//!
//! An object's index map (`...:obj:<id>:map`) is the authoritative record
//! of which indexes it belongs to and with which filters. The global and
//! filter sets of each index are derived from it and always updated in the
//! same transaction, under the object's lock.

mod codec;
mod group;
mod lock;
mod registry;
#[cfg(test)]
mod tests;

pub use group::IndexGroup;
pub(crate) use group::validate_group_name;
pub use lock::{LockWait, ObjectLock};
pub use registry::{IndexGroupRegistry, StoreRegistry};

use std::time::Duration;

/// Default seconds before an object lock expires.
pub const DEFAULT_OBJECT_LOCK_TTL: u64 = 5;

/// Default delay between two lock attempts.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tunables of an [`IndexGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexGroupOptions {
    /// Seconds before an object lock expires if its holder never releases it.
    pub object_lock_ttl: u64,
    /// Delay between two lock attempts while waiting.
    pub lock_poll_interval: Duration,
    /// Safety-net TTL of temporary calculation keys, in seconds.
    pub temporary_key_ttl: u64,
}

impl Default for IndexGroupOptions {
    fn default() -> Self {
        Self {
            object_lock_ttl: DEFAULT_OBJECT_LOCK_TTL,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            temporary_key_ttl: crate::set::TEMPORARY_KEY_TTL,
        }
    }
}
