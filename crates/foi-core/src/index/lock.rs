//! Per-object write locks.
//!
//! A lock is a marker key set with `SET key 1 NX EX ttl`. Its existence
//! means a writer holds the object. The TTL bounds how long a crashed
//! holder can block others; the wait timeout bounds how long a caller
//! polls before giving up.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{Clock, Store};

/// How long a mutation polls for an object lock.
///
/// # Example
///
/// ```rust,ignore
/// let wait = LockWait::seconds(0)?; // one attempt, no waiting
/// group.add_object_to_index("salt", "recipe", ["dinner"], wait)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockWait(u64);

impl LockWait {
    /// Default wait timeout in seconds.
    pub const DEFAULT_SECS: u64 = 3;

    /// Validated wait timeout. Negative values are rejected.
    pub fn seconds(secs: i64) -> Result<Self> {
        u64::try_from(secs).map(Self).map_err(|_| {
            Error::InvalidArgument(format!(
                "lock wait timeout {secs} must be a non-negative integer"
            ))
        })
    }

    /// Wait timeout from an unsigned number of seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn no_wait() -> Self {
        Self(0)
    }

    /// Timeout in seconds.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Timeout as a duration.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for LockWait {
    fn default() -> Self {
        Self(Self::DEFAULT_SECS)
    }
}

impl TryFrom<i64> for LockWait {
    type Error = Error;

    fn try_from(secs: i64) -> Result<Self> {
        Self::seconds(secs)
    }
}

/// Held object lock.
///
/// Released explicitly with [`ObjectLock::release`]; dropping an
/// unreleased lock deletes the key too, so early returns and panics
/// never leave it behind.
#[derive(Debug)]
pub struct ObjectLock {
    store: Arc<dyn Store>,
    key: String,
    released: bool,
}

impl ObjectLock {
    /// Polls `SET key 1 NX EX ttl` until it succeeds or `wait` elapses.
    ///
    /// At least one attempt is always made. Fails with
    /// [`Error::LockedObject`] on timeout, in which case no lock is held.
    /// A wait beyond the clock's range polls until the lock is free.
    pub fn acquire(
        store: Arc<dyn Store>,
        clock: &dyn Clock,
        key: String,
        object_id: &str,
        ttl_secs: u64,
        wait: LockWait,
        poll_interval: Duration,
    ) -> Result<Self> {
        // A wait too long to represent as an instant never times out
        let deadline = clock.now().checked_add(wait.as_duration());
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            if store.set_nx_ex(&key, "1", ttl_secs)? {
                debug!(key = %key, attempts, "Acquired object lock");
                return Ok(Self {
                    store,
                    key,
                    released: false,
                });
            }
            if deadline.is_some_and(|deadline| clock.now() >= deadline) {
                warn!(
                    object_id = %object_id,
                    timeout_secs = wait.as_secs(),
                    attempts,
                    "Exceeded object lock wait timeout"
                );
                return Err(Error::LockedObject {
                    object_id: object_id.to_string(),
                    timeout_secs: wait.as_secs(),
                });
            }
            clock.sleep(poll_interval);
        }
    }

    /// Lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deletes the lock key.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.delete()
    }

    fn delete(&self) -> Result<()> {
        self.store.del(vec![self.key.clone()])?;
        debug!(key = %self.key, "Released object lock");
        Ok(())
    }
}

impl Drop for ObjectLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.delete() {
            warn!(key = %self.key, error = %e, "Failed to release object lock");
        }
    }
}
