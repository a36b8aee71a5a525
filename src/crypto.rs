// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Crypto Engine
//!
//! Per-secret key generation and authenticated encryption.
//!
//! ## Envelope Layout
//!
//! ```text
//! +-----------+---------------------------+-----------+
//! | nonce(12) | ciphertext (len = input)  | tag(16)   |
//! +-----------+---------------------------+-----------+
//! ```
//!
//! The nonce is a fixed-size prefix, so [`open`] never needs out-of-band
//! length information.
//!
//! ## Key Custody
//!
//! Keys are never persisted server-side. The store only ever sees the
//! envelope; the key travels inside the shareable address and is zeroized
//! when the last in-memory copy is dropped.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM standard nonce size in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

// =============================================================================
// Errors
// =============================================================================

/// Failures raised by the crypto engine.
///
/// `DecryptionFailed` deliberately carries no detail: a short envelope, a
/// wrong key and a failed tag check all look the same to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("secure randomness unavailable")]
    RandomnessUnavailable,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key material")]
    InvalidKey,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

// =============================================================================
// Key and Envelope Types
// =============================================================================

/// Symmetric key for a single secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Build a key from raw bytes. Anything but exactly [`KEY_LEN`] bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(array))
    }

    /// Parse the lowercase hex form used in shareable addresses.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let well_formed = encoded.len() == KEY_LEN * 2
            && encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(CryptoError::InvalidKey);
        }

        let mut decoded = hex::decode(encoded).map_err(|_| CryptoError::InvalidKey)?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Lowercase hex encoding of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Nonce-prefixed authenticated ciphertext, exactly as written to the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Envelope({} bytes)", self.0.len())
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Fill `buf` from the operating system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> CryptoResult<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        tracing::error!(error = %e, "OS entropy source failed");
        CryptoError::RandomnessUnavailable
    })
}

/// Generate a fresh random key.
pub fn generate_key() -> CryptoResult<EncryptionKey> {
    let mut key = EncryptionKey([0u8; KEY_LEN]);
    fill_random(&mut key.0)?;
    Ok(key)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce and no associated data.
pub fn seal(plaintext: &[u8], key: &EncryptionKey) -> CryptoResult<Envelope> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(Envelope(sealed))
}

/// Authenticate and decrypt an envelope produced by [`seal`].
pub fn open(envelope: &Envelope, key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
    if envelope.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;
    let (nonce, ciphertext) = envelope.as_bytes().split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
