//! Command dispatch.
//!
//! Maps a command name plus raw arguments onto store operations and
//! builds the RESP response. This layer owns all user-visible argument
//! validation: the store itself never fails, so every `ERR ...` frame a
//! client sees originates here. Dispatch errors keep the connection
//! open; only protocol violations (handled upstream) close it.
//!
//! Registered commands:
//!
//! | Command | Form |
//! |---|---|
//! | `PING`   | `PING [message]` |
//! | `SET`    | `SET key value [EX seconds \| PX milliseconds]` |
//! | `GET`    | `GET key` |
//! | `DEL`    | `DEL key [key ...]` |
//! | `EXPIRE` | `EXPIRE key seconds` |
//! | `TTL`    | `TTL key` |
//! | `GETAT`  | `GETAT key timestamp-ms` |
//! | `HIST`   | `HIST key [limit]` |

use crate::protocol::RespValue;
use crate::storage::VersionedStore;
use bytes::Bytes;
use std::sync::Arc;

/// Routes commands to the store. Cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    store: Arc<VersionedStore>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<VersionedStore>) -> Self {
        Self { store }
    }

    /// Executes one command. `name` is the upper-cased command name.
    pub fn dispatch(&self, name: &str, args: &[Bytes]) -> RespValue {
        match name {
            "PING" => self.cmd_ping(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),
            "GETAT" => self.cmd_getat(args),
            "HIST" => self.cmd_hist(args),
            _ => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }

    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [message] => RespValue::bulk_string(message.clone()),
            _ => wrong_arity("ping"),
        }
    }

    /// `SET key value [EX seconds | PX milliseconds]`
    ///
    /// TTL options come in option/value pairs; a trailing option with
    /// no value is a syntax error, and a later pair overrides an
    /// earlier one.
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("set");
        }

        let key = args[0].clone();
        let value = args[1].clone();
        let mut ttl_ms: i64 = 0;

        let mut i = 2;
        while i < args.len() {
            if i + 1 >= args.len() {
                return RespValue::error("ERR syntax error");
            }

            let option = match arg_str(&args[i]) {
                Some(s) => s.to_uppercase(),
                None => return RespValue::error("ERR syntax error"),
            };

            let ttl = arg_i64(&args[i + 1]);
            match option.as_str() {
                "PX" => match ttl {
                    Some(ttl) if ttl > 0 => ttl_ms = ttl,
                    _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                },
                "EX" => match ttl {
                    Some(ttl) if ttl > 0 => ttl_ms = ttl.saturating_mul(1000),
                    _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                },
                _ => return RespValue::error(format!("ERR syntax error near '{}'", option)),
            }

            i += 2;
        }

        self.store.set(key, value, ttl_ms);
        RespValue::ok()
    }

    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [key] = args else {
            return wrong_arity("get");
        };

        match self.store.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null_bulk(),
        }
    }

    fn cmd_del(&self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return wrong_arity("del");
        }

        let deleted = args.iter().filter(|key| self.store.delete(key)).count();
        RespValue::integer(deleted as i64)
    }

    /// `EXPIRE key seconds`; the seconds-to-milliseconds conversion
    /// happens here, the store only speaks milliseconds.
    fn cmd_expire(&self, args: &[Bytes]) -> RespValue {
        let [key, seconds] = args else {
            return wrong_arity("expire");
        };

        let Some(seconds) = arg_i64(seconds) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };

        if self.store.expire(key, seconds.saturating_mul(1000)) {
            RespValue::integer(1)
        } else {
            RespValue::integer(0)
        }
    }

    /// `TTL key`, reported in whole seconds. The `-1`/`-2` sentinels
    /// pass through undivided.
    fn cmd_ttl(&self, args: &[Bytes]) -> RespValue {
        let [key] = args else {
            return wrong_arity("ttl");
        };

        let ttl_ms = self.store.ttl(key);
        let ttl_seconds = if ttl_ms < 0 { ttl_ms } else { ttl_ms / 1000 };
        RespValue::integer(ttl_seconds)
    }

    fn cmd_getat(&self, args: &[Bytes]) -> RespValue {
        let [key, timestamp] = args else {
            return wrong_arity("getat");
        };

        let Some(timestamp) = arg_i64(timestamp) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };

        match self.store.get_at(key, timestamp) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null_bulk(),
        }
    }

    /// `HIST key [limit]`, answered as a flat array of
    /// `[write_ts, value, write_ts, value, ...]`, newest first.
    fn cmd_hist(&self, args: &[Bytes]) -> RespValue {
        let (key, limit_arg) = match args {
            [key] => (key, None),
            [key, limit] => (key, Some(limit)),
            _ => return wrong_arity("hist"),
        };

        let limit = match limit_arg {
            None => 0,
            Some(raw) => match arg_i64(raw) {
                Some(limit) if limit >= 0 => limit as usize,
                _ => return RespValue::error("ERR value is not a valid limit"),
            },
        };

        let history = self.store.history(key, limit);

        let mut result = Vec::with_capacity(history.len() * 2);
        for version in history {
            result.push(RespValue::integer(version.write_ts));
            result.push(RespValue::bulk_string(version.data));
        }

        RespValue::array(result)
    }
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

fn arg_str(arg: &Bytes) -> Option<&str> {
    std::str::from_utf8(arg).ok()
}

fn arg_i64(arg: &Bytes) -> Option<i64> {
    arg_str(arg)?.parse().ok()
}
