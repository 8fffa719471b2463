//! # Filtered Object Index
//!
//! Maps object identifiers to named indexes, each membership carrying zero
//! or more filter tags, on top of a Redis-compatible store.
//!
//! ## Features
//!
//! - **Consistent mutations**: per-object locks plus one transaction per
//!   add/remove/move keep the object's index map and the derived sets in step
//! - **Lazy set algebra**: UNION/INTERSECTION trees of any depth resolve in
//!   one pipelined round trip
//! - **Grouped filter queries**: `(a OR b) AND (c OR d)` compiled to the
//!   cheapest set expression
//! - **Pluggable store**: in-memory store with Redis semantics, or a real
//!   Redis server behind the `redis` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use foi_core::{FilterQuery, IndexGroup, IndexGroupOptions, LockWait, MemoryStore, ObjectSet};
//!
//! let store = Arc::new(MemoryStore::new());
//! let group = IndexGroup::new("food", store, IndexGroupOptions::default())?;
//!
//! group.add_object_to_index("salt", "recipe", ["dinner", "dessert"], LockWait::default())?;
//! group.add_object_to_index("carrot", "recipe", ["vegetable", "dinner"], LockWait::default())?;
//!
//! let query = FilterQuery::new()
//!     .with_group(["dinner", "vegetable"])?
//!     .with_group(["dessert"])?;
//! let set = group.create_set_for_query("recipe", &query)?;
//! assert_eq!(set.object_ids()?, ["salt"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::wildcard_imports)]

pub mod config;
#[cfg(test)]
mod config_tests;
pub mod error;
pub mod index;
pub mod keys;
pub mod query;
pub mod set;
pub mod store;

pub use config::{ConfigError, FoiConfig, GroupConfig, LockConfig};
pub use error::{Error, Result};
pub use index::{
    IndexGroup, IndexGroupOptions, IndexGroupRegistry, LockWait, ObjectLock, StoreRegistry,
};
pub use keys::Namespace;
pub use query::FilterQuery;
pub use set::{ComputedSet, EphemeralSet, ObjectSet, SetContext, SetExpr, SetOperation, StoredSet};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{
    Batch, BatchReply, Clock, Command, ManualClock, MemoryStore, Reply, Store, SystemClock,
};
