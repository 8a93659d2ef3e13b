// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::DatasetKey;
use crate::record::Record;
use crate::watermark::Watermark;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Persistence backend error: {0}")]
    Backend(String),
    #[error("Corrupt snapshot for '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// A `(snapshot, watermark)` pair, always saved and loaded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub records: Vec<Record>,
    pub watermark: Watermark,
}

impl PersistedSnapshot {
    #[must_use]
    pub fn new(records: Vec<Record>, watermark: Watermark) -> Self {
        Self { records, watermark }
    }

    /// Encode to the stored `(snapshot_json, watermark)` strings.
    pub fn encode(&self) -> Result<(String, String), PersistenceError> {
        let json = serde_json::to_string(&self.records)
            .map_err(|e| PersistenceError::Backend(format!("Failed to encode snapshot: {}", e)))?;
        Ok((json, self.watermark.as_str().to_string()))
    }

    /// Decode stored strings; any malformed part makes the pair unusable.
    pub fn decode(key: &DatasetKey, snapshot_json: &str, watermark: &str) -> Result<Self, PersistenceError> {
        let records: Vec<Record> = serde_json::from_str(snapshot_json).map_err(|e| {
            PersistenceError::Corrupt { key: key.storage_key(), reason: e.to_string() }
        })?;
        let watermark = Watermark::from_server(watermark).ok_or_else(|| PersistenceError::Corrupt {
            key: key.storage_key(),
            reason: "blank watermark".to_string(),
        })?;
        Ok(Self { records, watermark })
    }
}

/// Durable key/value store for per-dataset snapshots.
///
/// Implementations must write the pair atomically: a reader never sees a
/// watermark without its matching records, or the reverse. `load` treats
/// absent or unparsable data as an empty cache.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, key: &DatasetKey) -> Result<Option<PersistedSnapshot>, PersistenceError>;
    async fn save(&self, key: &DatasetKey, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError>;
    async fn clear(&self, key: &DatasetKey) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ViewKind;

    fn key() -> DatasetKey {
        DatasetKey::new(ViewKind::ByCity, false)
    }

    #[test]
    fn test_encode_decode() {
        let snapshot = PersistedSnapshot::new(
            vec![Record::new("a", "Laval").with_district("Chomedey")],
            Watermark::from_server("2026-03-01T10:00:00Z").unwrap(),
        );
        let (json, watermark) = snapshot.encode().unwrap();
        let decoded = PersistedSnapshot::decode(&key(), &json, &watermark).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = PersistedSnapshot::decode(&key(), "{not json", "T0").unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
        assert!(err.to_string().contains("clients.by_city.all"));

        let err = PersistedSnapshot::decode(&key(), "[]", "").unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }
}
