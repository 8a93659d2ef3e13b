// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local snapshot of the remote record set.
//!
//! The [`RecordStore`] owns the records, the watermark they are consistent
//! with, and the [`HierarchicalIndex`] derived from them. Every mutation
//! goes through the store so the index can never drift from the records:
//! after any call, the index's leaf total equals [`RecordStore::len`].
//!
//! # Example
//!
//! ```
//! use client_sync::{Authoritative, PruneOutcome, Record, RecordStore};
//! use std::collections::HashSet;
//!
//! let mut store = RecordStore::new();
//! store.bootstrap(vec![Record::new("a", "Laval"), Record::new("b", "Laval")], None);
//!
//! // An empty authoritative set never deletes anything
//! let outcome = store.prune_deleted(&Authoritative::Complete(HashSet::new()));
//! assert!(matches!(outcome, PruneOutcome::Refused(_)));
//! assert_eq!(store.len(), 2);
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::index::{CityProjection, HierarchicalIndex, IndexPath};
use crate::record::{Record, RecordId};
use crate::watermark::Watermark;

/// Counts from an upsert pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// New ids
    pub inserted: usize,
    /// Existing ids whose index path changed
    pub relocated: usize,
    /// Existing ids that stayed in their leaf
    pub updated: usize,
    /// Records rejected because they have no city
    pub skipped: usize,
}

impl UpsertReport {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.inserted + self.relocated + self.updated
    }
}

/// The server's authoritative id set, as far as the client could tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authoritative {
    /// The fetch succeeded and returned this set.
    Complete(HashSet<RecordId>),
    /// The fetch failed or its response was unusable.
    Unavailable,
}

impl Authoritative {
    /// Collect ids from a successful listing.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordId>,
    {
        Self::Complete(ids.into_iter().map(Into::into).collect())
    }
}

/// Why a prune did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneRefusal {
    EmptySet,
    Unavailable,
}

impl std::fmt::Display for PruneRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySet => write!(f, "empty_set"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Result of [`RecordStore::prune_deleted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// Ids removed from the store (possibly none).
    Pruned(Vec<RecordId>),
    Refused(PruneRefusal),
}

impl PruneOutcome {
    #[must_use]
    pub fn removed(&self) -> usize {
        match self {
            Self::Pruned(ids) => ids.len(),
            Self::Refused(_) => 0,
        }
    }
}

/// Records, their watermark and the hierarchical index over them.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, Record>,
    watermark: Option<Watermark>,
    index: HierarchicalIndex,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    #[must_use]
    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    /// Adopt a server-issued watermark.
    pub fn set_watermark(&mut self, watermark: Watermark) {
        self.watermark = Some(watermark);
    }

    #[must_use]
    pub fn index(&self) -> &HierarchicalIndex {
        &self.index
    }

    /// Records sorted by id, the form persisted to disk.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Replace all state and rebuild the index in one pass.
    pub fn bootstrap<I>(&mut self, records: I, watermark: Option<Watermark>) -> UpsertReport
    where
        I: IntoIterator<Item = Record>,
    {
        self.records.clear();
        self.index.clear();
        self.watermark = watermark;
        let report = self.apply_upserts(records);
        debug!(records = self.records.len(), skipped = report.skipped, "Store bootstrapped");
        report
    }

    /// Upsert whole records, relocating any whose index path changed.
    ///
    /// A record without a city is skipped and, if already stored, keeps its
    /// previous version.
    pub fn apply_upserts<I>(&mut self, records: I) -> UpsertReport
    where
        I: IntoIterator<Item = Record>,
    {
        let mut report = UpsertReport::default();

        for record in records {
            let Some(path) = IndexPath::for_record(&record) else {
                warn!(id = %record.id, "Skipping record without city");
                report.skipped += 1;
                continue;
            };

            let existed = self.records.contains_key(&record.id);
            let moved = self.index.insert(record.id.clone(), path).is_some();
            self.records.insert(record.id.clone(), record);

            match (existed, moved) {
                (false, _) => report.inserted += 1,
                (true, true) => report.relocated += 1,
                (true, false) => report.updated += 1,
            }
        }

        debug_assert_eq!(self.index.leaf_total(), self.records.len());
        report
    }

    /// Replace one record atomically, returning its new path.
    ///
    /// Returns `None` and leaves the store untouched if the record cannot
    /// be indexed.
    pub fn replace_record(&mut self, record: Record) -> Option<IndexPath> {
        let path = IndexPath::for_record(&record)?;
        self.index.insert(record.id.clone(), path.clone());
        self.records.insert(record.id.clone(), record);
        Some(path)
    }

    /// Remove one record and its leaf entry.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let record = self.records.remove(id)?;
        self.index.remove(id);
        Some(record)
    }

    /// Remove every record whose id is absent from `authoritative`.
    ///
    /// Refuses to run on an empty or unavailable set: that is never read
    /// as "everything was deleted".
    pub fn prune_deleted(&mut self, authoritative: &Authoritative) -> PruneOutcome {
        let ids = match authoritative {
            Authoritative::Unavailable => {
                warn!("Authoritative id set unavailable, skipping prune");
                return PruneOutcome::Refused(PruneRefusal::Unavailable);
            }
            Authoritative::Complete(ids) if ids.is_empty() => {
                warn!(local = self.records.len(), "Authoritative id set empty, skipping prune");
                return PruneOutcome::Refused(PruneRefusal::EmptySet);
            }
            Authoritative::Complete(ids) => ids,
        };

        let mut removed: Vec<RecordId> = self
            .records
            .keys()
            .filter(|id| !ids.contains(*id))
            .cloned()
            .collect();
        removed.sort();

        for id in &removed {
            self.records.remove(id);
            self.index.remove(id);
        }

        if !removed.is_empty() {
            debug!(removed = removed.len(), remaining = self.records.len(), "Pruned deleted records");
        }
        PruneOutcome::Pruned(removed)
    }

    /// Flattened city → ids projection of the index.
    #[must_use]
    pub fn project(&self) -> CityProjection {
        self.index.project()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::SectorTag;

    fn laval(id: &str, district: &str) -> Record {
        Record::new(id, "Laval").with_district(district)
    }

    fn chomedey() -> IndexPath {
        IndexPath::SectorDistrict { sector: SectorTag::Laval, district: "Chomedey".into() }
    }

    #[test]
    fn test_bootstrap_replaces_everything() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey")], None);
        store.bootstrap(vec![laval("b", "Vimont")], Watermark::from_server("T0"));

        assert_eq!(store.len(), 1);
        assert!(!store.contains("a"));
        assert_eq!(store.index().leaf_total(), 1);
        assert_eq!(store.watermark().unwrap().as_str(), "T0");
    }

    #[test]
    fn test_upsert_report() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey"), laval("b", "Chomedey")], None);

        let mut renamed = laval("b", "Chomedey");
        renamed.first_name = "Nouveau".into();
        let report = store.apply_upserts(vec![
            laval("a", "Vimont"),
            renamed,
            laval("c", "Vimont"),
            Record::new("d", ""),
        ]);

        assert_eq!(
            report,
            UpsertReport { inserted: 1, relocated: 1, updated: 1, skipped: 1 }
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.index().leaf_total(), 3);
        assert_eq!(store.get("b").unwrap().first_name, "Nouveau");
    }

    #[test]
    fn test_cityless_upsert_keeps_previous_version() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey")], None);
        store.apply_upserts(vec![Record::new("a", "  ")]);
        assert_eq!(store.get("a").unwrap().city, "Laval");
        assert_eq!(store.index().leaf(&chomedey()), ["a".to_string()]);
    }

    #[test]
    fn test_remove_drops_record_and_leaf() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey"), laval("b", "Chomedey")], None);

        assert_eq!(store.remove("a").map(|r| r.id), Some("a".to_string()));
        assert!(store.remove("a").is_none());
        assert_eq!(store.index().leaf(&chomedey()), ["b".to_string()]);
        assert_eq!(store.index().leaf_total(), store.len());
    }

    #[test]
    fn test_prune_removes_absent() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey"), laval("b", "Chomedey"), laval("c", "Vimont")], None);

        let outcome = store.prune_deleted(&Authoritative::from_ids(["a", "c"]));
        assert_eq!(outcome, PruneOutcome::Pruned(vec!["b".into()]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.index().leaf(&chomedey()).len(), 1);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey"), laval("b", "Chomedey")], None);
        let ids = Authoritative::from_ids(["a"]);

        assert_eq!(store.prune_deleted(&ids).removed(), 1);
        assert_eq!(store.prune_deleted(&ids), PruneOutcome::Pruned(vec![]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prune_refuses_empty_and_unavailable() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey")], None);

        assert_eq!(
            store.prune_deleted(&Authoritative::Complete(HashSet::new())),
            PruneOutcome::Refused(PruneRefusal::EmptySet)
        );
        assert_eq!(
            store.prune_deleted(&Authoritative::Unavailable),
            PruneOutcome::Refused(PruneRefusal::Unavailable)
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_record_relocates() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey")], None);

        let path = store.replace_record(Record::new("a", "Brossard")).unwrap();
        assert_eq!(path, IndexPath::City { sector: SectorTag::RiveSud, city: "Brossard".into() });
        assert!(store.index().leaf(&chomedey()).is_empty());
        assert_eq!(store.index().leaf_total(), 1);
    }

    #[test]
    fn test_replace_record_rejects_unindexable() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("a", "Chomedey")], None);
        assert!(store.replace_record(Record::new("a", "")).is_none());
        assert_eq!(store.get("a").unwrap().city, "Laval");
    }

    #[test]
    fn test_snapshot_sorted() {
        let mut store = RecordStore::new();
        store.bootstrap(vec![laval("c", "X"), laval("a", "X"), laval("b", "X")], None);
        let ids: Vec<String> = store.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
