// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into an immutable [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `HOST_URL` | Public base URL that links are rendered under | `http://localhost:<PORT>` |
//! | `STORE_BACKEND` | `redis`, `redb` or `memory` | `redis` |
//! | `REDIS_ADDRESS` | `host:port` or `redis://` URL | `127.0.0.1:6379` |
//! | `REDIS_TAKE_MODE` | `getdel` (Redis 6.2+) or `script` | `getdel` |
//! | `DATA_DIR` | Directory for the redb file | `./data` |
//! | `DEFAULT_TTL` | TTL when the sender gives none | `30m` |
//! | `MAX_TTL` | Upper bound on any TTL | `168h` |
//! | `MAX_SECRET_BYTES` | Largest accepted secret | `65536` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Startup values are validated strictly: an unparsable `PORT` or
//! `DEFAULT_TTL` stops the process. Only the per-request `ttl` field
//! falls back silently.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::lifecycle::{
    parse_duration, LifecycleSettings, TtlPolicy, DEFAULT_MAX_SECRET_BYTES, DEFAULT_MAX_TTL,
    DEFAULT_TTL,
};
use crate::store::{remote::redis_url, StoreSettings, TakeMode};

/// Environment variable name for the server bind address.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the server bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the public base URL.
///
/// Links are rendered as `<HOST_URL>/<token>/<key>`, so this must be the
/// address recipients reach the service at, not the bind address.
pub const HOST_URL_ENV: &str = "HOST_URL";

/// Environment variable name selecting the secret store backend.
pub const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

/// Environment variable name for the Redis address.
pub const REDIS_ADDRESS_ENV: &str = "REDIS_ADDRESS";

/// Environment variable name for the Redis take strategy.
pub const REDIS_TAKE_MODE_ENV: &str = "REDIS_TAKE_MODE";

/// Environment variable name for the embedded store directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the default secret TTL.
pub const DEFAULT_TTL_ENV: &str = "DEFAULT_TTL";

/// Environment variable name for the maximum secret TTL.
pub const MAX_TTL_ENV: &str = "MAX_TTL";

/// Environment variable name for the secret size limit.
pub const MAX_SECRET_BYTES_ENV: &str = "MAX_SECRET_BYTES";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REDIS_ADDRESS: &str = "127.0.0.1:6379";
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// File name of the redb database inside `DATA_DIR`.
pub const EMBEDDED_DB_FILE: &str = "secrets.redb";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a port number, got '{value}'")]
    InvalidPort { var: &'static str, value: String },

    #[error("{var} must be an absolute http(s) URL, got '{value}'")]
    InvalidUrl { var: &'static str, value: String },

    #[error("{var} must be a positive duration such as '30m', got '{value}'")]
    InvalidDuration { var: &'static str, value: String },

    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("unknown {var} '{value}' (expected {expected})")]
    UnknownChoice {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("DEFAULT_TTL ({default_secs}s) exceeds MAX_TTL ({max_secs}s)")]
    TtlBounds { default_secs: u64, max_secs: u64 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Log Format
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`. Unknown values fall back to pretty output so that
    /// logging is always available to report other configuration errors.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub public_url: Url,
    pub store: StoreSettings,
    pub ttl: TtlPolicy,
    pub max_secret_bytes: usize,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidPort {
                var: PORT_ENV,
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let public_url = match get(HOST_URL_ENV) {
            Some(value) => parse_public_url(&value)?,
            None => parse_public_url(&format!("http://localhost:{port}"))?,
        };

        let store = match get(STORE_BACKEND_ENV).as_deref().map(str::to_ascii_lowercase) {
            None => redis_settings(&get)?,
            Some(backend) => match backend.as_str() {
                "redis" => redis_settings(&get)?,
                "redb" | "embedded" => StoreSettings::Embedded {
                    path: PathBuf::from(
                        get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
                    )
                    .join(EMBEDDED_DB_FILE),
                },
                "memory" => StoreSettings::Memory,
                _ => {
                    return Err(ConfigError::UnknownChoice {
                        var: STORE_BACKEND_ENV,
                        value: backend,
                        expected: "redis, redb or memory",
                    })
                }
            },
        };

        let default_ttl = duration_var(&get, DEFAULT_TTL_ENV, DEFAULT_TTL)?;
        let max_ttl = duration_var(&get, MAX_TTL_ENV, DEFAULT_MAX_TTL)?;
        if default_ttl > max_ttl {
            return Err(ConfigError::TtlBounds {
                default_secs: default_ttl.as_secs(),
                max_secs: max_ttl.as_secs(),
            });
        }

        let max_secret_bytes = match get(MAX_SECRET_BYTES_ENV) {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: MAX_SECRET_BYTES_ENV,
                    value,
                })?,
            None => DEFAULT_MAX_SECRET_BYTES,
        };

        Ok(Self {
            host,
            port,
            public_url,
            store,
            ttl: TtlPolicy {
                default_ttl,
                max_ttl,
            },
            max_secret_bytes,
            log_format: LogFormat::from_value(get(LOG_FORMAT_ENV).as_deref()),
        })
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the secret lifecycle coordinator.
    pub fn lifecycle(&self) -> LifecycleSettings {
        LifecycleSettings {
            public_url: self.public_url.clone(),
            ttl: self.ttl,
            max_secret_bytes: self.max_secret_bytes,
        }
    }
}

fn parse_public_url(value: &str) -> ConfigResult<Url> {
    let invalid = || ConfigError::InvalidUrl {
        var: HOST_URL_ENV,
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid());
    }
    Ok(url)
}

fn redis_settings(get: &impl Fn(&str) -> Option<String>) -> ConfigResult<StoreSettings> {
    let address = get(REDIS_ADDRESS_ENV).unwrap_or_else(|| DEFAULT_REDIS_ADDRESS.to_string());
    let take_mode = match get(REDIS_TAKE_MODE_ENV) {
        Some(value) => TakeMode::from_str(&value).map_err(|_| ConfigError::UnknownChoice {
            var: REDIS_TAKE_MODE_ENV,
            value,
            expected: "getdel or script",
        })?,
        None => TakeMode::default(),
    };
    Ok(StoreSettings::Redis {
        url: redis_url(&address),
        take_mode,
    })
}

fn duration_var(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> ConfigResult<Duration> {
    match get(var) {
        Some(value) => parse_duration(&value)
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::InvalidDuration { var, value }),
        None => Ok(default),
    }
}
