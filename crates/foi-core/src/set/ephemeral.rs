//! Stored set whose key is deleted when the owning scope releases it.

use serde::{Serialize, Serializer};

use tracing::{debug, warn};

use super::{serialize_members, ObjectSet, SetContext, StoredSet};
use crate::error::Result;
use crate::store::Batch;

/// Temporary materialized set.
///
/// Call [`EphemeralSet::release`] to delete the backing key and observe
/// failures. Dropping an unreleased set deletes the key as well, logging
/// instead of reporting errors. An expiry on the key only covers crashes.
#[derive(Debug)]
pub struct EphemeralSet {
    set: StoredSet,
    released: bool,
}

impl EphemeralSet {
    pub(crate) fn new(set: StoredSet) -> Self {
        Self {
            set,
            released: false,
        }
    }

    /// Key of the backing set.
    #[must_use]
    pub fn key(&self) -> &str {
        self.set.key()
    }

    /// Underlying stored set handle.
    #[must_use]
    pub fn as_stored(&self) -> &StoredSet {
        &self.set
    }

    /// Deletes the backing key.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.delete()
    }

    fn delete(&self) -> Result<()> {
        self.set.context().store().del(vec![self.set.key().to_string()])?;
        debug!(key = %self.set.key(), "Released ephemeral set");
        Ok(())
    }
}

impl Drop for EphemeralSet {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.delete() {
            warn!(key = %self.set.key(), error = %e, "Failed to delete unreleased ephemeral set");
        }
    }
}

impl ObjectSet for EphemeralSet {
    fn context(&self) -> &SetContext {
        self.set.context()
    }

    fn count(&self) -> Result<usize> {
        self.set.count()
    }

    fn object_ids(&self) -> Result<&[String]> {
        self.set.object_ids()
    }

    fn has_object(&self, object_id: &str) -> Result<bool> {
        self.set.has_object(object_id)
    }

    fn initialize_for_calculation(&self, batch: &mut Batch) -> Result<String> {
        self.set.initialize_for_calculation(batch)
    }
}

impl Serialize for EphemeralSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_members(self, serializer)
    }
}
