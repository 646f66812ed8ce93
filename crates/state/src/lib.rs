//! Manages configuration for the mantis-mcp server.
//!
//! This crate provides utilities for:
//! - Reading `MANTIS_*` environment variables.
//! - Snapshotting them into a [`MantisConfig`] consumed by the gateway
//!   and the CLI.
//!
//! Fixed protocol constants (request timeout, username-cache TTL,
//! compression threshold, page-size defaults) live next to the code that
//! uses them, not here; only operator-tunable values go through the
//! environment.

pub mod env;

pub use env::{api_token, api_url, cache_enabled, cache_ttl};

use std::time::Duration;

/// Snapshot of the configuration surface, taken once at startup.
///
/// Constructor-injected into the gateway so tests can build one directly
/// and point it at a local mock server instead of mutating the process
/// environment.
#[derive(Debug, Clone)]
pub struct MantisConfig {
    /// REST base URL, e.g. `https://tracker.example.com/api/rest`.
    pub base_url: String,
    /// Raw API key sent in the `Authorization` header, when configured.
    pub api_token: Option<String>,
    /// Whether the general request cache serves entries at all.
    pub cache_enabled: bool,
    /// Time-to-live for general request-cache entries.
    pub cache_ttl: Duration,
}

impl MantisConfig {
    /// Reads the full configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: env::api_url()?,
            api_token: env::api_token(),
            cache_enabled: env::cache_enabled(),
            cache_ttl: env::cache_ttl(),
        })
    }

    /// Builds a configuration for `base_url` with caching enabled and the
    /// default TTL. Used by tests pointing at a mock tracker.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            cache_enabled: true,
            cache_ttl: env::cache_ttl(),
        }
    }
}
