// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage token issuance.
//!
//! A storage token names a stored envelope. It carries no decryption
//! capability on its own, so it may appear in logs at `debug` level.
//! Tokens are random version-4 UUIDs in hyphenated form: 36 characters,
//! all within `[A-Za-z0-9_-]`.

use std::fmt;

use uuid::Builder;

use crate::crypto::{fill_random, CryptoResult};

/// Exact length of a storage token.
pub const TOKEN_LEN: usize = 36;

/// Opaque identifier under which an envelope is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageToken(String);

impl StorageToken {
    /// Validate an externally supplied token.
    ///
    /// Only the length and character class are checked; any 36-character
    /// URL-safe string is structurally valid even if it never existed.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == TOKEN_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Issue a new random storage token.
///
/// Draws from the OS CSPRNG directly so an entropy failure surfaces as
/// `RandomnessUnavailable` instead of a panic inside `Uuid::new_v4`.
pub fn new_token() -> CryptoResult<StorageToken> {
    let mut bytes = [0u8; 16];
    fill_random(&mut bytes)?;
    let uuid = Builder::from_random_bytes(bytes).into_uuid();
    Ok(StorageToken(uuid.hyphenated().to_string()))
}
