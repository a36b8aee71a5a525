// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use url::Url;

use crate::lifecycle::{LifecycleSettings, SecretService};
use crate::store::MemoryStore;

/// Shared handler state. Cloned per request; the coordinator inside holds
/// its store behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub secrets: SecretService,
}

impl AppState {
    pub fn new(secrets: SecretService) -> Self {
        Self { secrets }
    }
}

impl Default for AppState {
    /// In-memory store with links under `http://localhost:8080`.
    fn default() -> Self {
        let public_url = Url::parse("http://localhost:8080").expect("valid default URL");
        Self::new(SecretService::new(
            Arc::new(MemoryStore::new()),
            LifecycleSettings::new(public_url),
        ))
    }
}
