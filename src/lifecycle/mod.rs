// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Lifecycle Coordinator
//!
//! Orchestrates the crypto engine, token issuer and store into the two
//! operations the service exposes: **deposit** and **reveal**.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──put──▶ Stored ──take──▶ Consumed
//!                    │
//!                    └──ttl──▶ Expired
//! ```
//!
//! `Consumed` and `Expired` are terminal and indistinguishable to the
//! recipient: both read as [`SecretError::NotFound`].
//!
//! ## Error Boundary
//!
//! Crypto and store failures are logged here with their diagnostics and
//! translated into [`SecretError`] kinds. Nothing below this boundary
//! reaches a response body.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError};
use crate::store::{EphemeralStore, StoreError};
use crate::token::{self, StorageToken};

pub mod address;
pub mod ttl;

pub use address::Address;
pub use ttl::{parse_duration, TtlPolicy, DEFAULT_MAX_TTL, DEFAULT_TTL};

/// Default upper bound on a secret's plaintext size.
pub const DEFAULT_MAX_SECRET_BYTES: usize = 64 * 1024;

/// How many fresh tokens a deposit tries before giving up on collisions.
const MAX_TOKEN_ATTEMPTS: usize = 3;

// =============================================================================
// Errors
// =============================================================================

/// Outcome kinds surfaced by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("secure randomness unavailable")]
    RandomnessUnavailable,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("secret store write failed")]
    StoreWriteFailed,

    #[error("secret store unreachable")]
    StoreUnreachable,

    #[error("secret not found")]
    NotFound,

    #[error("secret could not be decrypted")]
    Corrupt,

    #[error("invalid secret address")]
    InvalidAddress,

    #[error("secret exceeds {limit} bytes")]
    SecretTooLarge { limit: usize },
}

impl From<CryptoError> for SecretError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::RandomnessUnavailable => SecretError::RandomnessUnavailable,
            CryptoError::EncryptionFailed | CryptoError::InvalidKey => SecretError::EncryptionFailed,
            CryptoError::DecryptionFailed => SecretError::Corrupt,
        }
    }
}

pub type SecretResult<T> = Result<T, SecretError>;

// =============================================================================
// Settings and Results
// =============================================================================

/// Immutable coordinator configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Base URL that shareable links are rendered under.
    pub public_url: Url,
    pub ttl: TtlPolicy,
    pub max_secret_bytes: usize,
}

impl LifecycleSettings {
    pub fn new(public_url: Url) -> Self {
        Self {
            public_url,
            ttl: TtlPolicy::default(),
            max_secret_bytes: DEFAULT_MAX_SECRET_BYTES,
        }
    }
}

/// A stored secret, as reported back to the sender.
#[derive(Debug, Clone)]
pub struct Deposit {
    /// Shareable link. Holds the key; hand it to the sender only.
    pub url: String,
    pub token: StorageToken,
    pub ttl: Duration,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// SecretService
// =============================================================================

/// Deposit/reveal coordinator over a shared store handle.
#[derive(Clone)]
pub struct SecretService {
    store: Arc<dyn EphemeralStore>,
    settings: Arc<LifecycleSettings>,
}

impl SecretService {
    pub fn new(store: Arc<dyn EphemeralStore>, settings: LifecycleSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Seal and store `plaintext`, returning the one-time link.
    ///
    /// The requested TTL is a duration string; anything unusable falls back
    /// to the configured default. If any step fails, neither key nor token
    /// is returned.
    pub async fn deposit(
        &self,
        plaintext: &[u8],
        requested_ttl: Option<&str>,
    ) -> SecretResult<Deposit> {
        let limit = self.settings.max_secret_bytes;
        if plaintext.len() > limit {
            return Err(SecretError::SecretTooLarge { limit });
        }

        let ttl = self.settings.ttl.normalize(requested_ttl);
        let key = crypto::generate_key()?;
        let envelope = crypto::seal(plaintext, &key).map_err(|e| {
            error!(error = %e, "failed to seal secret");
            SecretError::from(e)
        })?;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = token::new_token()?;
            match self.store.put(&token, &envelope, ttl).await {
                Ok(()) => {
                    let expires_at = chrono::Duration::from_std(ttl)
                        .ok()
                        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    info!(ttl_secs = ttl.as_secs(), "secret deposited");
                    debug!(token = %token, "secret stored");

                    let address = Address::new(token.clone(), key);
                    return Ok(Deposit {
                        url: address.to_link(&self.settings.public_url),
                        token,
                        ttl,
                        expires_at,
                    });
                }
                Err(StoreError::Occupied) => {
                    warn!(attempt, "storage token collision, issuing a new token");
                }
                Err(StoreError::Unreachable(detail)) => {
                    error!(error = %detail, "secret store unreachable during deposit");
                    return Err(SecretError::StoreUnreachable);
                }
                Err(e) => {
                    error!(error = %e, "failed to store secret");
                    return Err(SecretError::StoreWriteFailed);
                }
            }
        }

        error!(attempts = MAX_TOKEN_ATTEMPTS, "gave up after repeated token collisions");
        Err(SecretError::StoreWriteFailed)
    }

    /// Consume the secret behind `address`.
    ///
    /// The stored envelope is destroyed by this call whether or not it
    /// decrypts; a `Corrupt` outcome does not restore it.
    pub async fn reveal(&self, address: &Address) -> SecretResult<Zeroizing<Vec<u8>>> {
        let envelope = match self.store.take(address.token()).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(token = %address.token(), "secret not found");
                return Err(SecretError::NotFound);
            }
            Err(e) => {
                error!(error = %e, "secret store failed during reveal");
                return Err(SecretError::StoreUnreachable);
            }
        };

        match crypto::open(&envelope, address.key()) {
            Ok(plaintext) => {
                info!("secret revealed");
                Ok(Zeroizing::new(plaintext))
            }
            Err(_) => {
                warn!("consumed secret failed to decrypt");
                debug!(token = %address.token(), "corrupt secret discarded");
                Err(SecretError::Corrupt)
            }
        }
    }

    /// Reveal from the two path segments of a link.
    pub async fn reveal_parts(&self, token: &str, key_hex: &str) -> SecretResult<Zeroizing<Vec<u8>>> {
        let address = Address::from_parts(token, key_hex).ok_or(SecretError::InvalidAddress)?;
        self.reveal(&address).await
    }

    /// Reveal from a full link.
    pub async fn reveal_url(&self, link: &str) -> SecretResult<Zeroizing<Vec<u8>>> {
        let address = Address::parse(link).ok_or(SecretError::InvalidAddress)?;
        self.reveal(&address).await
    }

    /// Probe the backing store.
    pub async fn health(&self) -> SecretResult<()> {
        self.store.health().await.map_err(|e| {
            warn!(error = %e, "secret store health check failed");
            SecretError::StoreUnreachable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Envelope, KEY_LEN};
    use crate::store::{MemoryStore, StoreResult};
    use crate::token::TOKEN_LEN;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every store access and can corrupt envelopes on write.
    #[derive(Default)]
    struct InstrumentedStore {
        inner: MemoryStore,
        calls: AtomicUsize,
        flip_bit_on_put: bool,
        collisions_left: AtomicUsize,
        fail_writes: bool,
    }

    impl InstrumentedStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EphemeralStore for InstrumentedStore {
        async fn put(
            &self,
            token: &StorageToken,
            envelope: &Envelope,
            ttl: Duration,
        ) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Write("disk full".into()));
            }
            if self
                .collisions_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Occupied);
            }
            if self.flip_bit_on_put {
                let mut bytes = envelope.as_bytes().to_vec();
                bytes[crypto::NONCE_LEN] ^= 0x80;
                return self.inner.put(token, &Envelope::from_bytes(bytes), ttl).await;
            }
            self.inner.put(token, envelope, ttl).await
        }

        async fn take(&self, token: &StorageToken) -> StoreResult<Option<Envelope>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.take(token).await
        }

        async fn health(&self) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.health().await
        }
    }

    fn settings() -> LifecycleSettings {
        LifecycleSettings::new(Url::parse("https://host").unwrap())
    }

    fn service_with(store: Arc<InstrumentedStore>) -> SecretService {
        SecretService::new(store, settings())
    }

    fn memory_service() -> SecretService {
        SecretService::new(Arc::new(MemoryStore::new()), settings())
    }

    #[tokio::test]
    async fn deposit_then_reveal_returns_plaintext_once() {
        let service = memory_service();
        let deposit = service
            .deposit(b"launch codes: 42", Some("10m"))
            .await
            .unwrap();
        assert_eq!(deposit.ttl, Duration::from_secs(600));

        let plaintext = service.reveal_url(&deposit.url).await.unwrap();
        assert_eq!(plaintext.as_slice(), b"launch codes: 42");

        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap_err(),
            SecretError::NotFound
        );
    }

    #[tokio::test]
    async fn deposit_link_has_documented_shape() {
        let service = memory_service();
        let deposit = service.deposit(b"x", None).await.unwrap();

        let rest = deposit.url.strip_prefix("https://host/").unwrap();
        let (token, key) = rest.split_once('/').unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(token, deposit.token.as_str());
        assert_eq!(key.len(), KEY_LEN * 2);
        assert!(key.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[tokio::test]
    async fn missing_or_bad_ttl_uses_default() {
        let service = memory_service();
        assert_eq!(service.deposit(b"a", None).await.unwrap().ttl, DEFAULT_TTL);
        assert_eq!(
            service.deposit(b"a", Some("tomorrow")).await.unwrap().ttl,
            DEFAULT_TTL
        );
    }

    #[tokio::test]
    async fn expires_at_tracks_ttl() {
        let service = memory_service();
        let before = Utc::now();
        let deposit = service.deposit(b"a", Some("1h")).await.unwrap();
        let delta = deposit.expires_at - before;
        assert!(delta >= chrono::Duration::minutes(59));
        assert!(delta <= chrono::Duration::minutes(61));
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_after_ttl_is_not_found() {
        let service = memory_service();
        let deposit = service.deposit(b"short lived", Some("5s")).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap_err(),
            SecretError::NotFound
        );
    }

    #[tokio::test]
    async fn tampered_envelope_is_corrupt_and_consumed() {
        let store = Arc::new(InstrumentedStore {
            flip_bit_on_put: true,
            ..Default::default()
        });
        let service = service_with(store.clone());
        let deposit = service.deposit(b"do not alter", None).await.unwrap();

        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap_err(),
            SecretError::Corrupt
        );
        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap_err(),
            SecretError::NotFound
        );
    }

    #[tokio::test]
    async fn wrong_key_is_corrupt() {
        let service = memory_service();
        let deposit = service.deposit(b"mine", None).await.unwrap();
        let other_key = crypto::generate_key().unwrap();

        let result = service
            .reveal_parts(deposit.token.as_str(), &other_key.to_hex())
            .await;
        assert_eq!(result.unwrap_err(), SecretError::Corrupt);
    }

    #[tokio::test]
    async fn malformed_address_never_touches_store() {
        let store = Arc::new(InstrumentedStore::default());
        let service = service_with(store.clone());
        let key = crypto::generate_key().unwrap().to_hex();
        let token = token::new_token().unwrap();

        let cases = [
            ("short-token".to_string(), key.clone()),
            (token.to_string(), "abc".to_string()),
            (token.to_string(), key.to_uppercase()),
            (format!("{}!", &token.as_str()[1..]), key.clone()),
        ];
        for (bad_token, bad_key) in &cases {
            assert_eq!(
                service.reveal_parts(bad_token, bad_key).await.unwrap_err(),
                SecretError::InvalidAddress
            );
        }
        assert_eq!(
            service.reveal_url("https://host/nothing").await.unwrap_err(),
            SecretError::InvalidAddress
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reveals_have_one_winner() {
        let service = memory_service();
        let deposit = service.deposit(b"race me", None).await.unwrap();

        let first = {
            let service = service.clone();
            let url = deposit.url.clone();
            tokio::spawn(async move { service.reveal_url(&url).await })
        };
        let second = {
            let service = service.clone();
            let url = deposit.url.clone();
            tokio::spawn(async move { service.reveal_url(&url).await })
        };

        let outcomes = [first.await.unwrap(), second.await.unwrap()];
        let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].as_slice(), b"race me");
        assert!(outcomes
            .iter()
            .any(|r| r.as_ref().err() == Some(&SecretError::NotFound)));
    }

    #[tokio::test]
    async fn token_collision_retries_with_fresh_token() {
        let store = Arc::new(InstrumentedStore {
            collisions_left: AtomicUsize::new(2),
            ..Default::default()
        });
        let service = service_with(store.clone());

        let deposit = service.deposit(b"eventually", None).await.unwrap();
        assert_eq!(store.calls(), 3);
        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap().as_slice(),
            b"eventually"
        );
    }

    #[tokio::test]
    async fn persistent_collisions_fail_the_deposit() {
        let store = Arc::new(InstrumentedStore {
            collisions_left: AtomicUsize::new(10),
            ..Default::default()
        });
        let service = service_with(store.clone());

        assert_eq!(
            service.deposit(b"never", None).await.unwrap_err(),
            SecretError::StoreWriteFailed
        );
        assert_eq!(store.calls(), MAX_TOKEN_ATTEMPTS);
    }

    #[tokio::test]
    async fn store_write_failure_is_not_retried() {
        let store = Arc::new(InstrumentedStore {
            fail_writes: true,
            ..Default::default()
        });
        let service = service_with(store.clone());

        assert_eq!(
            service.deposit(b"lost", None).await.unwrap_err(),
            SecretError::StoreWriteFailed
        );
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn payload_limits_are_enforced() {
        let mut settings = settings();
        settings.max_secret_bytes = 8;
        let service = SecretService::new(Arc::new(MemoryStore::new()), settings);

        assert_eq!(
            service.deposit(b"123456789", None).await.unwrap_err(),
            SecretError::SecretTooLarge { limit: 8 }
        );
        assert!(service.deposit(b"12345678", None).await.is_ok());
    }

    #[tokio::test]
    async fn empty_plaintext_round_trips() {
        let service = memory_service();
        let deposit = service.deposit(b"", Some("10m")).await.unwrap();
        assert_eq!(deposit.ttl, Duration::from_secs(600));

        let plaintext = service.reveal_url(&deposit.url).await.unwrap();
        assert!(plaintext.is_empty());
        assert_eq!(
            service.reveal_url(&deposit.url).await.unwrap_err(),
            SecretError::NotFound
        );
    }

    #[tokio::test]
    async fn health_reflects_store() {
        let service = memory_service();
        service.health().await.unwrap();
    }

    #[test]
    fn crypto_errors_map_to_coordinator_kinds() {
        assert_eq!(
            SecretError::from(CryptoError::RandomnessUnavailable),
            SecretError::RandomnessUnavailable
        );
        assert_eq!(
            SecretError::from(CryptoError::EncryptionFailed),
            SecretError::EncryptionFailed
        );
        assert_eq!(
            SecretError::from(CryptoError::DecryptionFailed),
            SecretError::Corrupt
        );
    }
}
