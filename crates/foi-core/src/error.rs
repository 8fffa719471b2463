//! Error types for the filtered object index.
//!
//! Every fallible operation in this crate returns [`Result`]. Error codes
//! follow the pattern `FOI-XXX` so log lines can be matched to a variant.

use thiserror::Error;

/// Result type alias for filtered object index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in filtered object index operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Object lock could not be acquired before the wait timeout (FOI-001).
    ///
    /// No mutation happened: the lock was never held.
    #[error("[FOI-001] Exceeded lock wait timeout ({timeout_secs} seconds) for objectId {object_id}")]
    LockedObject {
        /// Object whose lock was contended.
        object_id: String,
        /// Wait timeout that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// Sets bound to different stores or tenants were composed (FOI-002).
    #[error("[FOI-002] Invalid set: {0}")]
    InvalidSet(String),

    /// A computed set without children was evaluated (FOI-003).
    #[error("[FOI-003] Computed set has no included sets")]
    NoIncludedSets,

    /// Caller supplied an invalid argument (FOI-004).
    #[error("[FOI-004] Invalid argument: {0}")]
    InvalidArgument(String),

    /// An object index map entry could not be decoded (FOI-005).
    ///
    /// The authoritative membership record is unreadable; never retried.
    #[error("[FOI-005] Failed to decode indexed filters at '{key}' field '{field}': {message}")]
    CorruptIndexMap {
        /// Hash key holding the entry.
        key: String,
        /// Hash field (index name).
        field: String,
        /// Decoder message.
        message: String,
    },

    /// The remote store rejected a command or the connection failed (FOI-006).
    #[error("[FOI-006] Store error: {0}")]
    Store(String),

    /// The store answered with a reply of an unexpected shape (FOI-007).
    #[error("[FOI-007] Unexpected reply to {command}: expected {expected}, got {actual}")]
    UnexpectedReply {
        /// Command verb that produced the reply.
        command: String,
        /// Reply shape the caller expected.
        expected: &'static str,
        /// Reply shape actually received.
        actual: String,
    },

    /// Configuration error (FOI-008).
    #[error("[FOI-008] Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the error code (e.g., "FOI-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockedObject { .. } => "FOI-001",
            Self::InvalidSet(_) => "FOI-002",
            Self::NoIncludedSets => "FOI-003",
            Self::InvalidArgument(_) => "FOI-004",
            Self::CorruptIndexMap { .. } => "FOI-005",
            Self::Store(_) => "FOI-006",
            Self::UnexpectedReply { .. } => "FOI-007",
            Self::Config(_) => "FOI-008",
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Lock contention and store failures are transient. Corruption and
    /// caller mistakes are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockedObject { .. } | Self::Store(_))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
