// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded secret store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `secrets`: storage token → `expires_at_ms (u64 BE) ‖ envelope`
//! - `secret_expiry`: `(expires_at_ms, token)` → `()`, ordered by deadline
//!
//! ## Expiry
//!
//! redb has no native TTL, so expiry is enforced inside the store's own
//! transactions: `take` refuses records past their deadline, and every `put`
//! walks `secret_expiry` from the front and removes only the records whose
//! deadline has passed, in the same write transaction that inserts the new
//! one. There is no background sweep.
//!
//! redb serializes write transactions, which makes remove-then-commit in
//! `take` an atomic fetch-and-delete.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use tracing::{debug, warn};

use super::{ttl_millis, EphemeralStore, StoreError, StoreResult};
use crate::crypto::Envelope;
use crate::token::StorageToken;

/// Primary table: storage token → expiry-prefixed envelope.
const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Deadline index: `(expires_at_ms, token)` in ascending order.
const SECRET_EXPIRY: TableDefinition<(u64, &str), ()> = TableDefinition::new("secret_expiry");

/// Size of the big-endian expiry prefix on every record.
const EXPIRY_PREFIX_LEN: usize = 8;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EmbeddedError {
    #[error("data directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),
}

pub type EmbeddedResult<T> = Result<T, EmbeddedError>;

// =============================================================================
// Record Encoding
// =============================================================================

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn encode_record(expires_at_ms: u64, envelope: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(EXPIRY_PREFIX_LEN + envelope.len());
    record.extend_from_slice(&expires_at_ms.to_be_bytes());
    record.extend_from_slice(envelope);
    record
}

/// Split a stored record into `(expires_at_ms, envelope)`.
fn decode_record(record: &[u8]) -> Option<(u64, &[u8])> {
    if record.len() < EXPIRY_PREFIX_LEN {
        return None;
    }
    let (prefix, envelope) = record.split_at(EXPIRY_PREFIX_LEN);
    let expires_at = u64::from_be_bytes(prefix.try_into().ok()?);
    Some((expires_at, envelope))
}

fn is_expired(record: &[u8], now_ms: u64) -> bool {
    decode_record(record).map_or(true, |(expires_at, _)| now_ms >= expires_at)
}

// =============================================================================
// Blocking Operations
// =============================================================================

/// Insert unless a live record already holds `token`. Returns whether the
/// record was written.
fn put_blocking(db: &Database, token: &str, envelope: &[u8], ttl: Duration) -> EmbeddedResult<bool> {
    let now = now_millis();

    let expires_at = now.saturating_add(ttl_millis(ttl));
    let record = encode_record(expires_at, envelope);

    let write_txn = db.begin_write()?;
    let inserted = {
        let mut table = write_txn.open_table(SECRETS)?;
        let mut index = write_txn.open_table(SECRET_EXPIRY)?;

        let purged = purge_expired(&mut table, &mut index, now)?;
        if purged > 0 {
            debug!(count = purged, "purged expired secrets");
        }

        let occupied = table.get(token)?.is_some();
        if !occupied {
            table.insert(token, record.as_slice())?;
            index.insert((expires_at, token), ())?;
        }
        !occupied
    };
    write_txn.commit()?;
    Ok(inserted)
}

/// Remove every record whose deadline is at or before `now`. Stops at the
/// first live deadline, so the cost is proportional to what is removed.
fn purge_expired(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    index: &mut Table<'_, (u64, &'static str), ()>,
    now: u64,
) -> EmbeddedResult<usize> {
    let mut due = Vec::new();
    for item in index.iter()? {
        let (key, _) = item?;
        let (expires_at, token) = key.value();
        if expires_at > now {
            break;
        }
        due.push((expires_at, token.to_owned()));
    }

    for (expires_at, token) in &due {
        index.remove((*expires_at, token.as_str()))?;
        let stale = table
            .get(token.as_str())?
            .is_some_and(|record| is_expired(record.value(), now));
        if stale {
            table.remove(token.as_str())?;
        }
    }
    Ok(due.len())
}

fn take_blocking(db: &Database, token: &str) -> EmbeddedResult<Option<Vec<u8>>> {
    let now = now_millis();

    let write_txn = db.begin_write()?;
    let removed: Option<Vec<u8>> = {
        let mut table = write_txn.open_table(SECRETS)?;
        let removed = table.remove(token)?.map(|guard| guard.value().to_vec());
        if let Some((expires_at, _)) = removed.as_deref().and_then(decode_record) {
            let mut index = write_txn.open_table(SECRET_EXPIRY)?;
            index.remove((expires_at, token))?;
        }
        removed
    };
    write_txn.commit()?;

    let Some(record) = removed else {
        return Ok(None);
    };
    match decode_record(&record) {
        Some((expires_at, envelope)) if now < expires_at => Ok(Some(envelope.to_vec())),
        Some(_) => {
            debug!(token = %token, "discarded expired secret on take");
            Ok(None)
        }
        None => {
            warn!("discarded malformed secret record");
            debug!(token = %token, "malformed record removed");
            Ok(None)
        }
    }
}

fn health_blocking(db: &Database) -> EmbeddedResult<()> {
    let read_txn = db.begin_read()?;
    let _ = read_txn.open_table(SECRETS)?;
    Ok(())
}

// =============================================================================
// EmbeddedStore
// =============================================================================

/// Single-file secret store.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_inner(path).map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    fn open_inner(path: &Path) -> EmbeddedResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(SECRET_EXPIRY)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    #[cfg(test)]
    fn stored_count(&self) -> usize {
        let read_txn = self.db.begin_read().unwrap();
        let table = read_txn.open_table(SECRETS).unwrap();
        table.iter().unwrap().count()
    }

    #[cfg(test)]
    fn indexed_count(&self) -> usize {
        let read_txn = self.db.begin_read().unwrap();
        let index = read_txn.open_table(SECRET_EXPIRY).unwrap();
        index.iter().unwrap().count()
    }
}

#[async_trait]
impl EphemeralStore for EmbeddedStore {
    async fn put(
        &self,
        token: &StorageToken,
        envelope: &Envelope,
        ttl: Duration,
    ) -> StoreResult<()> {
        let db = self.db.clone();
        let token = token.as_str().to_owned();
        let bytes = envelope.as_bytes().to_vec();

        let inserted = tokio::task::spawn_blocking(move || put_blocking(&db, &token, &bytes, ttl))
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?
            .map_err(|e| StoreError::Write(e.to_string()))?;

        if inserted {
            Ok(())
        } else {
            Err(StoreError::Occupied)
        }
    }

    async fn take(&self, token: &StorageToken) -> StoreResult<Option<Envelope>> {
        let db = self.db.clone();
        let token = token.as_str().to_owned();

        let taken = tokio::task::spawn_blocking(move || take_blocking(&db, &token))
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?
            .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(taken.map(Envelope::from_bytes))
    }

    async fn health(&self) -> StoreResult<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || health_blocking(&db))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::new_token;

    fn temp_store() -> (EmbeddedStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedStore::open(&dir.path().join("secrets.redb")).unwrap();
        (store, dir)
    }

    fn envelope(byte: u8) -> Envelope {
        Envelope::from_bytes(vec![byte; 44])
    }

    #[test]
    fn record_encoding_prefixes_expiry() {
        let record = encode_record(0x0102, b"env");
        assert_eq!(&record[..EXPIRY_PREFIX_LEN], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(decode_record(&record), Some((0x0102, &b"env"[..])));
        assert_eq!(decode_record(&[1, 2, 3]), None);
    }

    #[tokio::test]
    async fn take_returns_value_once() {
        let (store, _dir) = temp_store();
        let token = new_token().unwrap();
        store
            .put(&token, &envelope(3), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.take(&token).await.unwrap(), Some(envelope(3)));
        assert_eq!(store.take(&token).await.unwrap(), None);
        assert_eq!(store.stored_count(), 0);
    }

    #[tokio::test]
    async fn put_refuses_to_overwrite_live_entry() {
        let (store, _dir) = temp_store();
        let token = new_token().unwrap();
        store
            .put(&token, &envelope(1), Duration::from_secs(60))
            .await
            .unwrap();

        let err = store
            .put(&token, &envelope(2), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Occupied));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let (store, _dir) = temp_store();
        let token = new_token().unwrap();
        store
            .put(&token, &envelope(1), Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.take(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_purges_expired_records() {
        let (store, _dir) = temp_store();
        for _ in 0..3 {
            store
                .put(&new_token().unwrap(), &envelope(1), Duration::from_millis(5))
                .await
                .unwrap();
        }
        assert_eq!(store.stored_count(), 3);

        tokio::time::sleep(Duration::from_millis(30)).await;

        store
            .put(&new_token().unwrap(), &envelope(2), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.stored_count(), 1);
        assert_eq!(store.indexed_count(), 1);
    }

    #[tokio::test]
    async fn purge_leaves_live_records_alone() {
        let (store, _dir) = temp_store();
        let long_lived = new_token().unwrap();
        store
            .put(&long_lived, &envelope(7), Duration::from_secs(600))
            .await
            .unwrap();
        store
            .put(&new_token().unwrap(), &envelope(1), Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        store
            .put(&new_token().unwrap(), &envelope(2), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.stored_count(), 2);
        assert_eq!(store.indexed_count(), 2);
        assert_eq!(store.take(&long_lived).await.unwrap(), Some(envelope(7)));
    }

    #[tokio::test]
    async fn take_drops_the_expiry_entry() {
        let (store, _dir) = temp_store();
        let token = new_token().unwrap();
        store
            .put(&token, &envelope(4), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.indexed_count(), 1);

        store.take(&token).await.unwrap();
        assert_eq!(store.indexed_count(), 0);
    }

    #[test]
    fn open_reports_unusable_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = match EmbeddedStore::open(&blocker.join("secrets.redb")) {
            Ok(_) => panic!("open should fail beneath a regular file"),
            Err(e) => e,
        };
        assert!(
            matches!(&err, StoreError::Unreachable(msg) if msg.starts_with("data directory error")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.redb");
        let token = new_token().unwrap();

        {
            let store = EmbeddedStore::open(&path).unwrap();
            store
                .put(&token, &envelope(5), Duration::from_secs(60))
                .await
                .unwrap();
        }

        let reopened = EmbeddedStore::open(&path).unwrap();
        assert_eq!(reopened.take(&token).await.unwrap(), Some(envelope(5)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_yield_exactly_one_value() {
        let (store, _dir) = temp_store();
        let token = new_token().unwrap();
        store
            .put(&token, &envelope(8), Duration::from_secs(60))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let token = token.clone();
                tokio::spawn(async move { store.take(&token).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn health_succeeds_on_open_database() {
        let (store, _dir) = temp_store();
        store.health().await.unwrap();
    }
}
