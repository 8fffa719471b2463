//! In-process store with Redis semantics.
//!
//! Implements the subset of Redis used by the index: strings, hashes,
//! sets, per-key expiry, and cursor scans. Expired keys are purged lazily
//! on access, as Redis does for passive expiry.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};
use super::command::{Command, Reply};
use super::Store;
use crate::error::{Error, Result};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, Entry>,
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &str, now: Instant) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        self.purge_if_expired(key, now);
        self.entries.get_mut(key)
    }

    fn set_members(&mut self, key: &str, now: Instant) -> Result<Option<&BTreeSet<String>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(Some(&*members)),
            Some(_) => Err(Error::Store(WRONGTYPE.to_string())),
        }
    }

    fn set_entry(&mut self, key: &str, now: Instant) -> Result<&mut BTreeSet<String>> {
        self.purge_if_expired(key, now);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::Set(BTreeSet::new())));
        match &mut entry.value {
            Value::Set(members) => Ok(members),
            _ => Err(Error::Store(WRONGTYPE.to_string())),
        }
    }

    fn hash(&mut self, key: &str, now: Instant) -> Result<Option<&BTreeMap<String, String>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(Some(&*fields)),
            Some(_) => Err(Error::Store(WRONGTYPE.to_string())),
        }
    }

    fn hash_entry(&mut self, key: &str, now: Instant) -> Result<&mut BTreeMap<String, String>> {
        self.purge_if_expired(key, now);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::Hash(BTreeMap::new())));
        match &mut entry.value {
            Value::Hash(fields) => Ok(fields),
            _ => Err(Error::Store(WRONGTYPE.to_string())),
        }
    }

    /// Removes a hash or set key once its last element is gone.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Set(members)) => members.is_empty(),
            Some(Value::Hash(fields)) => fields.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn combine(&mut self, keys: &[String], now: Instant, union: bool) -> Result<BTreeSet<String>> {
        let mut result: Option<BTreeSet<String>> = None;
        for key in keys {
            let members = self.set_members(key, now)?.cloned().unwrap_or_default();
            result = Some(match result {
                None => members,
                Some(acc) if union => acc.union(&members).cloned().collect(),
                Some(acc) => acc.intersection(&members).cloned().collect(),
            });
        }
        Ok(result.unwrap_or_default())
    }

    fn store_set(&mut self, destination: &str, members: BTreeSet<String>) -> Reply {
        let len = members.len();
        if members.is_empty() {
            self.entries.remove(destination);
        } else {
            self.entries
                .insert(destination.to_string(), Entry::persistent(Value::Set(members)));
        }
        Reply::Int(len as i64)
    }

    fn live_keys(&mut self, now: Instant) -> Vec<String> {
        self.entries
            .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
        self.entries.keys().cloned().collect()
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, command: &Command, now: Instant) -> Result<Reply> {
        match command {
            Command::Set { key, value } => {
                self.entries
                    .insert(key.clone(), Entry::persistent(Value::Str(value.clone())));
                Ok(Reply::Ok)
            }
            Command::SetNxEx {
                key,
                value,
                ttl_secs,
            } => {
                if *ttl_secs == 0 {
                    return Err(Error::Store(
                        "ERR invalid expire time in 'set' command".to_string(),
                    ));
                }
                let expires_at = expiry(now, *ttl_secs, "set")?;
                if self.live(key, now).is_some() {
                    return Ok(Reply::Nil);
                }
                self.entries.insert(
                    key.clone(),
                    Entry {
                        value: Value::Str(value.clone()),
                        expires_at: Some(expires_at),
                    },
                );
                Ok(Reply::Ok)
            }
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    self.purge_if_expired(key, now);
                    if self.entries.remove(key).is_some() {
                        removed += 1;
                    }
                }
                Ok(Reply::Int(removed))
            }
            Command::Exists { key } => Ok(Reply::Int(i64::from(self.live(key, now).is_some()))),
            Command::Ttl { key } => Ok(Reply::Int(match self.live(key, now) {
                None => -2,
                Some(Entry {
                    expires_at: None, ..
                }) => -1,
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => {
                    let remaining = at.saturating_duration_since(now).as_millis();
                    ((remaining + 500) / 1000) as i64
                }
            })),
            Command::Expire { key, seconds } => {
                if self.live(key, now).is_none() {
                    return Ok(Reply::Int(0));
                }
                if *seconds == 0 {
                    self.entries.remove(key);
                } else {
                    let expires_at = expiry(now, *seconds, "expire")?;
                    if let Some(entry) = self.entries.get_mut(key) {
                        entry.expires_at = Some(expires_at);
                    }
                }
                Ok(Reply::Int(1))
            }
            Command::HSet { key, field, value } => {
                let fields = self.hash_entry(key, now)?;
                let added = fields.insert(field.clone(), value.clone()).is_none();
                Ok(Reply::Int(i64::from(added)))
            }
            Command::HDel { key, field } => {
                let exists = self.hash(key, now)?.is_some();
                let removed = exists && self.hash_entry(key, now)?.remove(field).is_some();
                self.drop_if_empty(key);
                Ok(Reply::Int(i64::from(removed)))
            }
            Command::HGet { key, field } => Ok(self
                .hash(key, now)?
                .and_then(|fields| fields.get(field).cloned())
                .map_or(Reply::Nil, Reply::Bulk)),
            Command::HGetAll { key } => Ok(Reply::Pairs(
                self.hash(key, now)?
                    .map(|fields| {
                        fields
                            .iter()
                            .map(|(f, v)| (f.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            )),
            Command::HExists { key, field } => Ok(Reply::Int(i64::from(
                self.hash(key, now)?
                    .is_some_and(|fields| fields.contains_key(field)),
            ))),
            Command::HKeys { key } => Ok(Reply::Array(
                self.hash(key, now)?
                    .map(|fields| fields.keys().cloned().collect())
                    .unwrap_or_default(),
            )),
            Command::SAdd { key, members } => {
                let set = self.set_entry(key, now)?;
                let added = members.iter().filter(|m| set.insert((*m).clone())).count();
                self.drop_if_empty(key);
                Ok(Reply::Int(added as i64))
            }
            Command::SRem { key, members } => {
                let exists = self.set_members(key, now)?.is_some();
                let removed = if exists {
                    let set = self.set_entry(key, now)?;
                    members.iter().filter(|m| set.remove(*m)).count()
                } else {
                    0
                };
                self.drop_if_empty(key);
                Ok(Reply::Int(removed as i64))
            }
            Command::SCard { key } => Ok(Reply::Int(
                self.set_members(key, now)?.map_or(0, |set| set.len() as i64),
            )),
            Command::SIsMember { key, member } => Ok(Reply::Int(i64::from(
                self.set_members(key, now)?
                    .is_some_and(|set| set.contains(member)),
            ))),
            Command::SMembers { key } => Ok(Reply::Array(
                self.set_members(key, now)?
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default(),
            )),
            Command::SScan { key, cursor, count } => {
                let members: Vec<String> = self
                    .set_members(key, now)?
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                Ok(page(members, *cursor, *count))
            }
            Command::SUnion { keys } => Ok(Reply::Array(
                self.combine(keys, now, true)?.into_iter().collect(),
            )),
            Command::SInter { keys } => Ok(Reply::Array(
                self.combine(keys, now, false)?.into_iter().collect(),
            )),
            Command::SUnionStore { destination, keys } => {
                let members = self.combine(keys, now, true)?;
                Ok(self.store_set(destination, members))
            }
            Command::SInterStore { destination, keys } => {
                let members = self.combine(keys, now, false)?;
                Ok(self.store_set(destination, members))
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                let keys: Vec<String> = self
                    .live_keys(now)
                    .into_iter()
                    .filter(|k| glob_match(pattern, k))
                    .collect();
                Ok(page(keys, *cursor, *count))
            }
        }
    }
}

/// Expiry instant `secs` from `now`, or the Redis error for a TTL out of range.
fn expiry(now: Instant, secs: u64, command: &str) -> Result<Instant> {
    now.checked_add(Duration::from_secs(secs))
        .ok_or_else(|| Error::Store(format!("ERR invalid expire time in '{command}' command")))
}

/// Slices a sorted item list into a scan page. The cursor is an offset.
fn page(items: Vec<String>, cursor: u64, count: usize) -> Reply {
    let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(items.len());
    let end = start.saturating_add(count.max(1)).min(items.len());
    let next = if end >= items.len() { 0 } else { end as u64 };
    Reply::Scan {
        cursor: next,
        items: items[start..end].to_vec(),
    }
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[^a]`, `[a-z]` and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_at(&p, &t)
}

fn glob_at(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => (0..=t.len()).any(|i| glob_at(&p[1..], &t[i..])),
        Some('?') => !t.is_empty() && glob_at(&p[1..], &t[1..]),
        Some('[') => {
            let Some(&c) = t.first() else {
                return false;
            };
            let Some(close) = p.iter().skip(1).position(|&x| x == ']').map(|i| i + 1) else {
                return c == '[' && glob_at(&p[1..], &t[1..]);
            };
            let class = &p[1..close];
            let (negate, class) = match class.first() {
                Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            let mut matched = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == '-' {
                    if class[i] <= c && c <= class[i + 2] {
                        matched = true;
                    }
                    i += 3;
                } else {
                    if class[i] == c {
                        matched = true;
                    }
                    i += 1;
                }
            }
            matched != negate && glob_at(&p[close + 1..], &t[1..])
        }
        Some('\\') if p.len() > 1 => t.first() == Some(&p[1]) && glob_at(&p[2..], &t[1..]),
        Some(&c) => t.first() == Some(&c) && glob_at(&p[1..], &t[1..]),
    }
}

/// In-process store with Redis semantics.
///
/// Pipelines and transactions hold the store lock for the whole batch, so
/// both are atomic with respect to other callers of the same instance.
#[derive(Debug)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store driven by `clock` (expiry is evaluated against it).
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            clock,
        }
    }

    /// Number of live keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        let now = self.clock.now();
        self.keyspace.lock().live_keys(now).len()
    }

    /// Removes every key (`FLUSHDB`).
    pub fn flush(&self) {
        self.keyspace.lock().entries.clear();
    }

    fn apply_all(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        let now = self.clock.now();
        let mut keyspace = self.keyspace.lock();
        let mut replies = Vec::with_capacity(commands.len());
        let mut first_error = None;
        // Like EXEC, a failing command does not stop the rest of the batch
        for command in commands {
            match keyspace.apply(command, now) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    replies.push(Reply::Nil);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(replies),
        }
    }
}

impl Store for MemoryStore {
    fn execute(&self, command: &Command) -> Result<Reply> {
        let now = self.clock.now();
        self.keyspace.lock().apply(command, now)
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.apply_all(commands)
    }

    fn transaction(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.apply_all(commands)
    }
}
