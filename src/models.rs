// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the HTTP surface. Each derives
//! `ToSchema` for the OpenAPI document.
//!
//! Bodies that carry plaintext are wiped from memory when dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Form submitted to store a secret.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct DepositForm {
    /// Plaintext to share.
    pub secret: String,
    /// Optional lifetime such as `10m` or `1h30m`. Unusable values fall
    /// back to the server default.
    #[serde(default)]
    pub ttl: Option<String>,
}

impl std::fmt::Debug for DepositForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositForm")
            .field("secret_len", &self.secret.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Returned once, to the sender, after a secret is stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DepositResponse {
    /// One-time link embedding the storage token and decryption key.
    pub url: String,
    /// When the secret becomes unrecoverable if nobody opens the link.
    pub expires_at: DateTime<Utc>,
    /// Effective TTL after defaulting and clamping.
    pub ttl_seconds: u64,
}

/// The revealed plaintext.
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct RevealResponse {
    pub secret: String,
}
