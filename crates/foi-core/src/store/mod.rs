//! Remote key-value/set store boundary.
//!
//! The index logic only talks to a [`Store`]: single commands, ordered
//! pipelines, and atomic transactions. Two implementations ship with the
//! crate:
//!
//! - [`MemoryStore`]: in-process store with Redis semantics (tests, embedded use)
//! - `RedisStore`: adapter over the `redis` crate (feature `redis`)

mod clock;
mod command;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Batch, BatchReply, Command, Reply};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::fmt;

use tracing::{debug, trace};

use crate::error::Result;

/// Page size hint for cursor scans.
pub const SCAN_PAGE_SIZE: usize = 500;

/// A Redis-compatible store.
///
/// Implementations must execute pipeline commands in order, and
/// transaction commands atomically (`MULTI`/`EXEC`).
pub trait Store: Send + Sync + fmt::Debug {
    /// Executes one command.
    fn execute(&self, command: &Command) -> Result<Reply>;

    /// Executes commands in order in one exchange, without atomicity.
    fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>>;

    /// Executes commands atomically in one exchange.
    fn transaction(&self, commands: &[Command]) -> Result<Vec<Reply>>;

    /// Submits a batch as a pipeline, or as a transaction when `atomic`.
    fn run_batch(&self, batch: Batch, atomic: bool) -> Result<BatchReply> {
        debug!(commands = batch.len(), atomic, "Submitting store batch");
        for command in batch.commands() {
            trace!(command = command.name(), write = command.is_write(), "batched");
        }
        let replies = if atomic {
            self.transaction(batch.commands())?
        } else {
            self.pipeline(batch.commands())?
        };
        Ok(batch.into_reply(replies))
    }

    /// `SET key value NX EX ttl`; returns whether the key was set.
    fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let command = Command::SetNxEx {
            key: key.to_string(),
            value: value.to_string(),
            ttl_secs,
        };
        self.execute(&command)?.into_bool(command.name())
    }

    /// Deletes keys; returns how many existed.
    fn del(&self, keys: Vec<String>) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let command = Command::Del { keys };
        let removed = self.execute(&command)?.into_int(command.name())?;
        Ok(u64::try_from(removed).unwrap_or(0))
    }

    /// Returns whether `key` exists.
    fn exists(&self, key: &str) -> Result<bool> {
        let command = Command::Exists {
            key: key.to_string(),
        };
        self.execute(&command)?.into_bool(command.name())
    }

    /// Remaining time to live: -2 if missing, -1 if persistent.
    fn ttl(&self, key: &str) -> Result<i64> {
        let command = Command::Ttl {
            key: key.to_string(),
        };
        self.execute(&command)?.into_int(command.name())
    }

    /// `HGET key field`
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let command = Command::HGet {
            key: key.to_string(),
            field: field.to_string(),
        };
        self.execute(&command)?.into_optional_string(command.name())
    }

    /// `HGETALL key`
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let command = Command::HGetAll {
            key: key.to_string(),
        };
        self.execute(&command)?.into_pairs(command.name())
    }

    /// `HEXISTS key field`
    fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let command = Command::HExists {
            key: key.to_string(),
            field: field.to_string(),
        };
        self.execute(&command)?.into_bool(command.name())
    }

    /// `HKEYS key`
    fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let command = Command::HKeys {
            key: key.to_string(),
        };
        self.execute(&command)?.into_members(command.name())
    }

    /// `SADD key members...`; returns how many were new.
    fn sadd(&self, key: &str, members: Vec<String>) -> Result<i64> {
        let command = Command::SAdd {
            key: key.to_string(),
            members,
        };
        self.execute(&command)?.into_int(command.name())
    }

    /// `SCARD key`
    fn scard(&self, key: &str) -> Result<usize> {
        let command = Command::SCard {
            key: key.to_string(),
        };
        let count = self.execute(&command)?.into_int(command.name())?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// `SISMEMBER key member`
    fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let command = Command::SIsMember {
            key: key.to_string(),
            member: member.to_string(),
        };
        self.execute(&command)?.into_bool(command.name())
    }

    /// `SMEMBERS key`
    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let command = Command::SMembers {
            key: key.to_string(),
        };
        self.execute(&command)?.into_members(command.name())
    }

    /// Full cursor scan (`SSCAN`) of the members of `key`.
    fn scan_members(&self, key: &str) -> Result<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor = 0;
        loop {
            let command = Command::SScan {
                key: key.to_string(),
                cursor,
                count: SCAN_PAGE_SIZE,
            };
            let (next, page) = self.execute(&command)?.into_scan(command.name())?;
            members.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SSCAN may return an element more than once
        members.sort_unstable();
        members.dedup();
        Ok(members)
    }

    /// Full cursor scan (`SCAN MATCH`) of the keys matching `pattern`.
    fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let command = Command::Scan {
                cursor,
                pattern: pattern.to_string(),
                count: SCAN_PAGE_SIZE,
            };
            let (next, page) = self.execute(&command)?.into_scan(command.name())?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}
