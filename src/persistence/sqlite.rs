// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed snapshot store.
//!
//! One row per dataset key. The records and the watermark live in the same
//! row and are written by a single upsert statement, so the pair is always
//! self-consistent on disk.
//!
//! ```sql
//! CREATE TABLE view_snapshots (
//!     dataset_key TEXT PRIMARY KEY,    -- e.g. "clients.by_city.frequent"
//!     snapshot_json TEXT NOT NULL,     -- JSON array of records
//!     watermark TEXT NOT NULL,         -- server-issued token
//!     record_count INTEGER NOT NULL,
//!     saved_at INTEGER NOT NULL        -- Unix timestamp (bookkeeping only)
//! );
//! ```

use async_trait::async_trait;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::{PersistedSnapshot, PersistenceError, SnapshotStore};
use crate::dataset::DatasetKey;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Snapshot persistence in a local SQLite file.
pub struct SqliteSnapshotStore {
    pool: AnyPool,
}

impl SqliteSnapshotStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, PersistenceError> {
        install_drivers();

        let url = format!("sqlite://{}?mode=rwc", path);
        let url = url.as_str();
        info!(path, "Opening snapshot store");

        let pool = retry("snapshot_db_open", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await
                .map_err(|e| PersistenceError::Backend(format!(
                    "Failed to open snapshot DB: {}", e
                )))
        })
        .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: AnyPool) -> Result<Self, PersistenceError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS view_snapshots (
                dataset_key TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                watermark TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                saved_at INTEGER NOT NULL
            )
            "#
        )
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(format!(
                "Failed to create view_snapshots table: {}", e
            )))?;

        Ok(())
    }

    /// Store raw strings, bypassing encoding.
    pub async fn insert_raw(
        &self,
        key: &DatasetKey,
        snapshot_json: &str,
        watermark: &str,
    ) -> Result<(), PersistenceError> {
        self.upsert(key, snapshot_json, watermark, 0).await
    }

    async fn upsert(
        &self,
        key: &DatasetKey,
        snapshot_json: &str,
        watermark: &str,
        record_count: usize,
    ) -> Result<(), PersistenceError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        sqlx::query(
            r#"
            INSERT INTO view_snapshots (dataset_key, snapshot_json, watermark, record_count, saved_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(dataset_key) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                watermark = excluded.watermark,
                record_count = excluded.record_count,
                saved_at = excluded.saved_at
            "#
        )
            .bind(key.storage_key())
            .bind(snapshot_json)
            .bind(watermark)
            .bind(record_count as i64)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(format!(
                "Failed to save snapshot: {}", e
            )))?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self, key: &DatasetKey) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        let row = sqlx::query(
            "SELECT snapshot_json, watermark FROM view_snapshots WHERE dataset_key = ?"
        )
            .bind(key.storage_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(format!(
                "Failed to load snapshot: {}", e
            )))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let snapshot_json: String = row.try_get("snapshot_json")
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let watermark: String = row.try_get("watermark")
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        match PersistedSnapshot::decode(key, &snapshot_json, &watermark) {
            Ok(snapshot) => {
                debug!(
                    key = %key,
                    records = snapshot.records.len(),
                    watermark = %snapshot.watermark,
                    "Loaded snapshot"
                );
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable snapshot");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &DatasetKey, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        let (json, watermark) = snapshot.encode()?;
        self.upsert(key, &json, &watermark, snapshot.records.len()).await?;
        debug!(
            key = %key,
            records = snapshot.records.len(),
            bytes = json.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    async fn clear(&self, key: &DatasetKey) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM view_snapshots WHERE dataset_key = ?")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(format!(
                "Failed to clear snapshot: {}", e
            )))?;

        Ok(())
    }
}
