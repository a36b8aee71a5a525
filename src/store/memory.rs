// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process store for development and tests.
//!
//! Entries live in a `HashMap` behind a mutex. Expiry is deadline-based:
//! an entry past its deadline is treated as absent on access and purged on
//! the next write. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{EphemeralStore, StoreError, StoreResult};
use crate::crypto::Envelope;
use crate::token::StorageToken;

struct Entry {
    envelope: Envelope,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries that have not yet expired.
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unreachable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn put(
        &self,
        token: &StorageToken,
        envelope: &Envelope,
        ttl: Duration,
    ) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, entry| entry.is_live(now));

        if entries.contains_key(token.as_str()) {
            return Err(StoreError::Occupied);
        }

        entries.insert(
            token.as_str().to_string(),
            Entry {
                envelope: envelope.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn take(&self, token: &StorageToken) -> StoreResult<Option<Envelope>> {
        let now = Instant::now();
        let removed = self.lock()?.remove(token.as_str());
        Ok(removed
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.envelope))
    }

    async fn health(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
