// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redis-backed secret store.
//!
//! Only three commands are used:
//!
//! | Operation | Command |
//! |-----------|---------|
//! | `put` | `SET token envelope NX PX <ttl_ms>` |
//! | `take` | `GETDEL token`, or [`TAKE_SCRIPT`] on servers older than 6.2 |
//! | `health` | `PING` |
//!
//! Both take modes run as a single server-side atomic step, so two reveals
//! racing on one token can never both receive the envelope.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, RedisError, Script};
use tracing::info;

use super::{ttl_millis, EphemeralStore, StoreError, StoreResult};
use crate::crypto::Envelope;
use crate::token::StorageToken;

/// GET followed by DEL, executed atomically inside the Redis server.
pub const TAKE_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if value then
    redis.call('DEL', KEYS[1])
end
return value
"#;

/// How `take` achieves atomic fetch-and-delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TakeMode {
    /// Native `GETDEL` (Redis 6.2+).
    #[default]
    GetDel,
    /// Lua script for older servers.
    Script,
}

impl FromStr for TakeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "getdel" => Ok(TakeMode::GetDel),
            "script" => Ok(TakeMode::Script),
            other => Err(format!("unknown take mode '{other}' (expected getdel or script)")),
        }
    }
}

/// Turn a `host:port` address into a connection URL. Full `redis://` or
/// `rediss://` URLs pass through unchanged.
pub fn redis_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}/0")
    }
}

fn is_connectivity(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
}

fn write_error(e: RedisError) -> StoreError {
    if is_connectivity(&e) {
        StoreError::Unreachable(e.to_string())
    } else {
        StoreError::Write(e.to_string())
    }
}

fn read_error(e: RedisError) -> StoreError {
    if is_connectivity(&e) {
        StoreError::Unreachable(e.to_string())
    } else {
        StoreError::Read(e.to_string())
    }
}

/// Store handle over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RemoteStore {
    conn: ConnectionManager,
    take_mode: TakeMode,
    take_script: Script,
}

impl RemoteStore {
    /// Connect to Redis at `url`. Fails if the server cannot be reached.
    pub async fn connect(url: &str, take_mode: TakeMode) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        info!(take_mode = ?take_mode, "connected to redis");
        Ok(Self {
            conn,
            take_mode,
            take_script: Script::new(TAKE_SCRIPT),
        })
    }
}

#[async_trait]
impl EphemeralStore for RemoteStore {
    async fn put(
        &self,
        token: &StorageToken,
        envelope: &Envelope,
        ttl: Duration,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(token.as_str())
            .arg(envelope.as_bytes())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(write_error)?;

        // SET ... NX replies nil when the key already exists.
        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::Occupied),
        }
    }

    async fn take(&self, token: &StorageToken) -> StoreResult<Option<Envelope>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = match self.take_mode {
            TakeMode::GetDel => redis::cmd("GETDEL")
                .arg(token.as_str())
                .query_async(&mut conn)
                .await
                .map_err(read_error)?,
            TakeMode::Script => self
                .take_script
                .key(token.as_str())
                .invoke_async(&mut conn)
                .await
                .map_err(read_error)?,
        };
        Ok(value.map(Envelope::from_bytes))
    }

    async fn health(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }
}
