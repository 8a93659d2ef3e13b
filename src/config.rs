// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync coordinator and its adapters.
//!
//! # Example
//!
//! ```
//! use client_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.request_timeout_ms, 15_000);
//! assert!(!config.frequent_only);
//!
//! // Full config
//! let config = SyncConfig {
//!     base_url: "https://crm.example.com/api".into(),
//!     snapshot_db_path: Some("/data/client_snapshots.db".into()),
//!     frequent_only: true,
//!     ..Default::default()
//! };
//! assert_eq!(config.retry().max_attempts, 3);
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::resilience::retry::RetryConfig;

/// Configuration for the sync engine.
///
/// All fields have defaults. A real deployment sets `base_url` and usually
/// `snapshot_db_path`; without a path, snapshots live in memory only.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Server root, without trailing slash (e.g. "https://crm.example.com/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout for server calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// SQLite file holding persisted snapshots (None = in-memory)
    #[serde(default)]
    pub snapshot_db_path: Option<String>,

    /// Initial value of the "frequent clients only" filter
    #[serde(default)]
    pub frequent_only: bool,

    /// Attempts per idempotent server read, including the first
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
}

fn default_base_url() -> String { "http://localhost:3000/api".to_string() }
fn default_request_timeout_ms() -> u64 { 15_000 }
fn default_retry_max_attempts() -> usize { 3 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            snapshot_db_path: None,
            frequent_only: false,
            retry_max_attempts: default_retry_max_attempts(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff policy for server reads.
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::query().with_max_attempts(self.retry_max_attempts)
    }
}
