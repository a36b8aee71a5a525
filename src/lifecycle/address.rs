// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shareable address encoding.
//!
//! An address is `<public-url>/<token>/<hex-key>`: the only artifact that
//! grants reveal capability. Decoding is purely structural and never
//! touches the store.

use std::fmt;

use url::Url;

use crate::crypto::EncryptionKey;
use crate::token::StorageToken;

/// Token plus key, as carried by a shareable link.
#[derive(Clone, PartialEq, Eq)]
pub struct Address {
    token: StorageToken,
    key: EncryptionKey,
}

impl Address {
    pub fn new(token: StorageToken, key: EncryptionKey) -> Self {
        Self { token, key }
    }

    /// Decode the two path segments of an address.
    pub fn from_parts(token: &str, key_hex: &str) -> Option<Self> {
        let token = StorageToken::parse(token)?;
        let key = EncryptionKey::from_hex(key_hex).ok()?;
        Some(Self { token, key })
    }

    /// Decode a full link or a bare `<token>/<key>` path.
    ///
    /// Only the last two path segments are significant; whatever precedes
    /// them (scheme, host, mount prefix) is ignored.
    pub fn parse(link: &str) -> Option<Self> {
        let path = link
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let mut segments = path.rsplit('/');
        let key_hex = segments.next()?;
        let token = segments.next()?;
        Self::from_parts(token, key_hex)
    }

    pub fn token(&self) -> &StorageToken {
        &self.token
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Render the link under `base`.
    pub fn to_link(&self, base: &Url) -> String {
        format!(
            "{}/{}/{}",
            base.as_str().trim_end_matches('/'),
            self.token,
            self.key.to_hex()
        )
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("token", &self.token)
            .field("key", &self.key)
            .finish()
    }
}
