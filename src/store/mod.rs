// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ephemeral Store Adapter
//!
//! Wraps the key-value store that holds sealed envelopes between deposit and
//! reveal. Every backend provides the same three guarantees:
//!
//! - **Server-side expiry**: an entry written with a TTL is unreadable once
//!   the TTL elapses. Nothing in this crate polls for expired entries.
//! - **Conditional write**: `put` never overwrites a live entry; a token
//!   collision surfaces as [`StoreError::Occupied`].
//! - **Atomic take**: `take` fetches and deletes in one indivisible step, so
//!   concurrent callers racing on a token see at most one success.
//!
//! Adapters never retry. A single failed attempt is reported upward.
//!
//! ## Backends
//!
//! | Backend | Module | Atomic take |
//! |---------|--------|-------------|
//! | Redis | [`remote`] | `GETDEL` or a server-side Lua script |
//! | redb file | [`embedded`] | single write transaction |
//! | in-process | [`memory`] | single mutex critical section |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::crypto::Envelope;
use crate::token::StorageToken;

pub mod embedded;
pub mod memory;
pub mod remote;

pub use embedded::EmbeddedStore;
pub use memory::MemoryStore;
pub use remote::{RemoteStore, TakeMode};

// =============================================================================
// Error Type
// =============================================================================

/// Opaque store failure. The message is for logs only and never reaches a
/// response body.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token already holds a live entry")]
    Occupied,

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store Contract
// =============================================================================

/// Key-value store with expiry and destroy-on-read semantics.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Write `envelope` under `token`, expiring after `ttl`.
    async fn put(&self, token: &StorageToken, envelope: &Envelope, ttl: Duration)
        -> StoreResult<()>;

    /// Atomically fetch and delete the envelope stored under `token`.
    ///
    /// Returns `Ok(None)` if the token never existed, was already taken, or
    /// has expired.
    async fn take(&self, token: &StorageToken) -> StoreResult<Option<Envelope>>;

    /// Liveness probe, independent of any secret.
    async fn health(&self) -> StoreResult<()>;
}

// =============================================================================
// Backend Selection
// =============================================================================

/// Which backend to open, with its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Redis { url: String, take_mode: TakeMode },
    Embedded { path: PathBuf },
    Memory,
}

/// Open the configured backend.
pub async fn connect(settings: &StoreSettings) -> StoreResult<Arc<dyn EphemeralStore>> {
    match settings {
        StoreSettings::Redis { url, take_mode } => {
            let store = RemoteStore::connect(url, *take_mode).await?;
            Ok(Arc::new(store))
        }
        StoreSettings::Embedded { path } => {
            let store = EmbeddedStore::open(path)?;
            Ok(Arc::new(store))
        }
        StoreSettings::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Store TTLs are expressed in whole milliseconds; anything shorter rounds
/// up to one so that a positive TTL never means "no expiry".
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
