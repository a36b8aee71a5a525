// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Burnlink - One-Time Secret Sharing Service
//!
//! A sender deposits a secret and receives a link. The first request for
//! that link returns the plaintext and destroys it; later requests, and
//! requests after the TTL, find nothing. The decryption key lives only in
//! the link, so the store never holds anything it can read.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `crypto` - AES-256-GCM sealing and key generation
//! - `token` - Random storage tokens
//! - `store` - Expiring, take-once envelope stores (Redis, redb, memory)
//! - `lifecycle` - Deposit and reveal coordination, TTLs, link encoding

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod state;
pub mod store;
pub mod token;
