//! Store commands, replies and command batches.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// One remote store command.
///
/// Each variant maps one-to-one onto the Redis command of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value`
    Set {
        /// Target key.
        key: String,
        /// Value to store.
        value: String,
    },
    /// `SET key value NX EX ttl`
    SetNxEx {
        /// Target key.
        key: String,
        /// Value to store.
        value: String,
        /// Expiry in seconds.
        ttl_secs: u64,
    },
    /// `DEL key [key ...]`
    Del {
        /// Keys to delete.
        keys: Vec<String>,
    },
    /// `EXISTS key`
    Exists {
        /// Key to test.
        key: String,
    },
    /// `TTL key`
    Ttl {
        /// Key to inspect.
        key: String,
    },
    /// `EXPIRE key seconds`
    Expire {
        /// Key to expire.
        key: String,
        /// Seconds until expiry.
        seconds: u64,
    },
    /// `HSET key field value`
    HSet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Field value.
        value: String,
    },
    /// `HDEL key field`
    HDel {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `HGET key field`
    HGet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `HGETALL key`
    HGetAll {
        /// Hash key.
        key: String,
    },
    /// `HEXISTS key field`
    HExists {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `HKEYS key`
    HKeys {
        /// Hash key.
        key: String,
    },
    /// `SADD key member [member ...]`
    SAdd {
        /// Set key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// `SREM key member [member ...]`
    SRem {
        /// Set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// `SCARD key`
    SCard {
        /// Set key.
        key: String,
    },
    /// `SISMEMBER key member`
    SIsMember {
        /// Set key.
        key: String,
        /// Member to test.
        member: String,
    },
    /// `SMEMBERS key`
    SMembers {
        /// Set key.
        key: String,
    },
    /// `SSCAN key cursor COUNT count`
    SScan {
        /// Set key.
        key: String,
        /// Cursor from the previous call, 0 to start.
        cursor: u64,
        /// Page size hint.
        count: usize,
    },
    /// `SUNION key [key ...]`
    SUnion {
        /// Source set keys.
        keys: Vec<String>,
    },
    /// `SINTER key [key ...]`
    SInter {
        /// Source set keys.
        keys: Vec<String>,
    },
    /// `SUNIONSTORE destination key [key ...]`
    SUnionStore {
        /// Key receiving the result.
        destination: String,
        /// Source set keys.
        keys: Vec<String>,
    },
    /// `SINTERSTORE destination key [key ...]`
    SInterStore {
        /// Key receiving the result.
        destination: String,
        /// Source set keys.
        keys: Vec<String>,
    },
    /// `SCAN cursor MATCH pattern COUNT count`
    Scan {
        /// Cursor from the previous call, 0 to start.
        cursor: u64,
        /// Glob pattern.
        pattern: String,
        /// Page size hint.
        count: usize,
    },
}

impl Command {
    /// Returns the wire verb of this command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } | Self::SetNxEx { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Exists { .. } => "EXISTS",
            Self::Ttl { .. } => "TTL",
            Self::Expire { .. } => "EXPIRE",
            Self::HSet { .. } => "HSET",
            Self::HDel { .. } => "HDEL",
            Self::HGet { .. } => "HGET",
            Self::HGetAll { .. } => "HGETALL",
            Self::HExists { .. } => "HEXISTS",
            Self::HKeys { .. } => "HKEYS",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SCard { .. } => "SCARD",
            Self::SIsMember { .. } => "SISMEMBER",
            Self::SMembers { .. } => "SMEMBERS",
            Self::SScan { .. } => "SSCAN",
            Self::SUnion { .. } => "SUNION",
            Self::SInter { .. } => "SINTER",
            Self::SUnionStore { .. } => "SUNIONSTORE",
            Self::SInterStore { .. } => "SINTERSTORE",
            Self::Scan { .. } => "SCAN",
        }
    }

    /// Returns true if the command writes to the store.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Set { .. }
                | Self::SetNxEx { .. }
                | Self::Del { .. }
                | Self::Expire { .. }
                | Self::HSet { .. }
                | Self::HDel { .. }
                | Self::SAdd { .. }
                | Self::SRem { .. }
                | Self::SUnionStore { .. }
                | Self::SInterStore { .. }
        )
    }
}

/// A store reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Missing value (`nil`).
    Nil,
    /// Status `OK`.
    Ok,
    /// Integer reply.
    Int(i64),
    /// Single string.
    Bulk(String),
    /// List of strings (members, keys, fields).
    Array(Vec<String>),
    /// Field/value pairs (`HGETALL`).
    Pairs(Vec<(String, String)>),
    /// One page of a cursor scan.
    Scan {
        /// Next cursor, 0 when the scan is complete.
        cursor: u64,
        /// Items of this page.
        items: Vec<String>,
    },
}

impl Reply {
    /// Short name of the reply shape, for diagnostics.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Ok => "ok",
            Self::Int(_) => "integer",
            Self::Bulk(_) => "bulk string",
            Self::Array(_) => "array",
            Self::Pairs(_) => "pairs",
            Self::Scan { .. } => "scan page",
        }
    }

    fn unexpected(self, command: &str, expected: &'static str) -> Error {
        Error::UnexpectedReply {
            command: command.to_string(),
            expected,
            actual: self.shape().to_string(),
        }
    }

    /// Interprets the reply as an integer.
    pub fn into_int(self, command: &str) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(n),
            other => Err(other.unexpected(command, "integer")),
        }
    }

    /// Interprets the reply as a flag: `OK`/non-zero is true, `nil`/0 is false.
    pub fn into_bool(self, command: &str) -> Result<bool> {
        match self {
            Self::Ok => Ok(true),
            Self::Nil => Ok(false),
            Self::Int(n) => Ok(n != 0),
            other => Err(other.unexpected(command, "flag")),
        }
    }

    /// Interprets the reply as an optional string.
    pub fn into_optional_string(self, command: &str) -> Result<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Bulk(s) => Ok(Some(s)),
            other => Err(other.unexpected(command, "bulk string or nil")),
        }
    }

    /// Interprets the reply as a list of strings.
    pub fn into_members(self, command: &str) -> Result<Vec<String>> {
        match self {
            Self::Array(items) => Ok(items),
            Self::Nil => Ok(Vec::new()),
            other => Err(other.unexpected(command, "array")),
        }
    }

    /// Interprets the reply as field/value pairs.
    pub fn into_pairs(self, command: &str) -> Result<Vec<(String, String)>> {
        match self {
            Self::Pairs(pairs) => Ok(pairs),
            Self::Nil => Ok(Vec::new()),
            other => Err(other.unexpected(command, "pairs")),
        }
    }

    /// Interprets the reply as a scan page.
    pub fn into_scan(self, command: &str) -> Result<(u64, Vec<String>)> {
        match self {
            Self::Scan { cursor, items } => Ok((cursor, items)),
            other => Err(other.unexpected(command, "scan page")),
        }
    }
}

/// Ordered list of commands submitted in one network exchange.
///
/// Commands can be tagged with an alias so their reply can be picked out
/// of the [`BatchReply`] without tracking positions.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<Command>,
    aliases: HashMap<String, usize>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command and returns its position.
    pub fn push(&mut self, command: Command) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }

    /// Appends a command whose reply is retrievable under `alias`.
    pub fn push_as(&mut self, alias: impl Into<String>, command: Command) -> usize {
        let position = self.push(command);
        self.aliases.insert(alias.into(), position);
        position
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands in submission order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn into_reply(self, replies: Vec<Reply>) -> BatchReply {
        BatchReply {
            replies,
            aliases: self.aliases,
        }
    }
}

/// Replies of an executed [`Batch`], in submission order.
#[derive(Debug, Clone)]
pub struct BatchReply {
    replies: Vec<Reply>,
    aliases: HashMap<String, usize>,
}

impl BatchReply {
    /// Reply tagged with `alias`, if any.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&Reply> {
        self.aliases.get(alias).and_then(|&i| self.replies.get(i))
    }

    /// Removes and returns the reply tagged with `alias`.
    pub fn take(&mut self, alias: &str) -> Result<Reply> {
        let position = self.aliases.remove(alias).ok_or_else(|| {
            Error::InvalidArgument(format!("no batch reply tagged '{alias}'"))
        })?;
        self.replies
            .get_mut(position)
            .map(|reply| std::mem::replace(reply, Reply::Nil))
            .ok_or_else(|| Error::Store(format!("batch reply for '{alias}' is missing")))
    }

    /// All replies in submission order.
    #[must_use]
    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    /// Number of replies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    /// Returns true if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}
