// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use super::traits::{PersistedSnapshot, PersistenceError, SnapshotStore};
use crate::dataset::DatasetKey;

/// In-process snapshot store.
///
/// Keeps the encoded `(snapshot_json, watermark)` strings, exactly as a
/// durable backend would, so decode failures behave the same way.
pub struct InMemorySnapshotStore {
    data: DashMap<String, (String, String)>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of stored datasets
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Store raw strings, bypassing encoding.
    pub fn insert_raw(&self, key: &DatasetKey, snapshot_json: &str, watermark: &str) {
        self.data
            .insert(key.storage_key(), (snapshot_json.to_string(), watermark.to_string()));
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, key: &DatasetKey) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        let Some(entry) = self.data.get(&key.storage_key()) else {
            return Ok(None);
        };
        let (json, watermark) = entry.value();
        match PersistedSnapshot::decode(key, json, watermark) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable snapshot");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &DatasetKey, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        let pair = snapshot.encode()?;
        self.data.insert(key.storage_key(), pair);
        Ok(())
    }

    async fn clear(&self, key: &DatasetKey) -> Result<(), PersistenceError> {
        self.data.remove(&key.storage_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ViewKind;
    use crate::record::Record;
    use crate::watermark::Watermark;

    fn snapshot(ids: &[&str], watermark: &str) -> PersistedSnapshot {
        PersistedSnapshot::new(
            ids.iter().map(|id| Record::new(*id, "Laval")).collect(),
            Watermark::from_server(watermark).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemorySnapshotStore::new();
        assert!(store.is_empty());
        let key = DatasetKey::new(ViewKind::ByCity, false);
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemorySnapshotStore::new();
        let key = DatasetKey::new(ViewKind::ByCity, false);

        store.save(&key, &snapshot(&["a", "b"], "T0")).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.watermark.as_str(), "T0");
    }

    #[tokio::test]
    async fn test_save_overwrites_pair() {
        let store = InMemorySnapshotStore::new();
        let key = DatasetKey::new(ViewKind::Map, false);

        store.save(&key, &snapshot(&["a"], "T0")).await.unwrap();
        store.save(&key, &snapshot(&["a", "b", "c"], "T1")).await.unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.watermark.as_str(), "T1");
    }

    #[tokio::test]
    async fn test_filters_use_separate_slots() {
        let store = InMemorySnapshotStore::new();
        let all = DatasetKey::new(ViewKind::ByCity, false);
        let frequent = DatasetKey::new(ViewKind::ByCity, true);

        store.save(&all, &snapshot(&["a", "b"], "T0")).await.unwrap();
        store.save(&frequent, &snapshot(&["a"], "T0")).await.unwrap();

        assert_eq!(store.load(&all).await.unwrap().unwrap().records.len(), 2);
        assert_eq!(store.load(&frequent).await.unwrap().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_empty() {
        let store = InMemorySnapshotStore::new();
        let key = DatasetKey::new(ViewKind::ByCity, false);
        store.insert_raw(&key, "[{\"broken\"", "T0");

        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemorySnapshotStore::new();
        let key = DatasetKey::new(ViewKind::ByCity, false);
        store.save(&key, &snapshot(&["a"], "T0")).await.unwrap();

        store.clear(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());

        // Clearing again is fine
        assert!(store.clear(&key).await.is_ok());
    }
}
