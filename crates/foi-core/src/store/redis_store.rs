//! Redis adapter over the `redis` crate's synchronous connection.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

use redis::{Cmd, Connection, FromRedisValue, Value};

use super::command::{Command, Reply};
use super::Store;
use crate::error::{Error, Result};

fn store_err(err: redis::RedisError) -> Error {
    Error::Store(err.to_string())
}

fn parse<T: FromRedisValue>(value: &Value) -> Result<T> {
    redis::from_redis_value(value).map_err(store_err)
}

/// [`Store`] backed by one Redis connection.
///
/// Commands from concurrent callers are serialized on the connection.
pub struct RedisStore {
    url: String,
    connection: Mutex<Connection>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let connection = client.get_connection().map_err(store_err)?;
        Ok(Self {
            url: url.to_string(),
            connection: Mutex::new(connection),
        })
    }

    fn to_cmd(command: &Command) -> Cmd {
        let mut cmd = redis::cmd(command.name());
        match command {
            Command::Set { key, value } => {
                cmd.arg(key).arg(value);
            }
            Command::SetNxEx {
                key,
                value,
                ttl_secs,
            } => {
                cmd.arg(key).arg(value).arg("NX").arg("EX").arg(*ttl_secs);
            }
            Command::Del { keys }
            | Command::SUnion { keys }
            | Command::SInter { keys } => {
                cmd.arg(keys);
            }
            Command::Exists { key }
            | Command::Ttl { key }
            | Command::HGetAll { key }
            | Command::HKeys { key }
            | Command::SCard { key }
            | Command::SMembers { key } => {
                cmd.arg(key);
            }
            Command::Expire { key, seconds } => {
                cmd.arg(key).arg(*seconds);
            }
            Command::HSet { key, field, value } => {
                cmd.arg(key).arg(field).arg(value);
            }
            Command::HDel { key, field }
            | Command::HGet { key, field }
            | Command::HExists { key, field } => {
                cmd.arg(key).arg(field);
            }
            Command::SAdd { key, members } | Command::SRem { key, members } => {
                cmd.arg(key).arg(members);
            }
            Command::SIsMember { key, member } => {
                cmd.arg(key).arg(member);
            }
            Command::SScan { key, cursor, count } => {
                cmd.arg(key).arg(*cursor).arg("COUNT").arg(*count);
            }
            Command::SUnionStore { destination, keys }
            | Command::SInterStore { destination, keys } => {
                cmd.arg(destination).arg(keys);
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                cmd.arg(*cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(*count);
            }
        }
        cmd
    }

    fn to_reply(command: &Command, value: &Value) -> Result<Reply> {
        match command {
            Command::Set { .. } | Command::SetNxEx { .. } => {
                Ok(match parse::<Option<String>>(value)? {
                    Some(_) => Reply::Ok,
                    None => Reply::Nil,
                })
            }
            Command::HGet { .. } => {
                Ok(parse::<Option<String>>(value)?.map_or(Reply::Nil, Reply::Bulk))
            }
            Command::HGetAll { .. } => {
                let fields: HashMap<String, String> = parse(value)?;
                Ok(Reply::Pairs(fields.into_iter().collect()))
            }
            Command::HKeys { .. }
            | Command::SMembers { .. }
            | Command::SUnion { .. }
            | Command::SInter { .. } => Ok(Reply::Array(parse(value)?)),
            Command::SScan { .. } | Command::Scan { .. } => {
                let (cursor, items): (u64, Vec<String>) = parse(value)?;
                Ok(Reply::Scan { cursor, items })
            }
            Command::Del { .. }
            | Command::Exists { .. }
            | Command::Ttl { .. }
            | Command::Expire { .. }
            | Command::HSet { .. }
            | Command::HDel { .. }
            | Command::HExists { .. }
            | Command::SAdd { .. }
            | Command::SRem { .. }
            | Command::SCard { .. }
            | Command::SIsMember { .. }
            | Command::SUnionStore { .. }
            | Command::SInterStore { .. } => Ok(Reply::Int(parse(value)?)),
        }
    }

    fn run(&self, commands: &[Command], atomic: bool) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        if atomic {
            pipe.atomic();
        }
        for command in commands {
            pipe.add_command(Self::to_cmd(command));
        }
        let values: Vec<Value> = {
            let mut connection = self.connection.lock();
            pipe.query(&mut *connection).map_err(store_err)?
        };
        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| Self::to_reply(command, value))
            .collect()
    }
}

impl Store for RedisStore {
    fn execute(&self, command: &Command) -> Result<Reply> {
        let value: Value = {
            let mut connection = self.connection.lock();
            Self::to_cmd(command)
                .query(&mut *connection)
                .map_err(store_err)?
        };
        Self::to_reply(command, &value)
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.run(commands, false)
    }

    fn transaction(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.run(commands, true)
    }
}
