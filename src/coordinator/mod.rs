// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] owns one view's local state and drives the sync
//! protocol against the server:
//! - bootstrap from the persisted `(snapshot, watermark)` pair
//! - delta check and incremental apply
//! - deletion reconciliation against the server's authoritative id set
//! - single-record address correction
//!
//! # Phases
//!
//! ```text
//! Idle → Bootstrapping → FullLoad ───────────────────────────────┐
//!                      → CheckingDelta → ApplyingDelta ─┐        ├→ Fresh | Stale | Error
//!                                      → DeletionOnly ──┴→ ReconcilingDeletions
//! ```
//!
//! # Generations
//!
//! Every sequence captures a generation number when it starts. Forced
//! reloads, filter switches and teardown bump the counter; a sequence whose
//! generation is no longer current drops its results instead of applying
//! them. State is only mutated under the write lock, after re-checking the
//! generation, and no lock is held across an `.await`.
//!
//! # Example
//!
//! ```rust,no_run
//! use client_sync::{SyncConfig, SyncCoordinator, SyncPhase, ViewKind};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), client_sync::SyncError> {
//! let config = SyncConfig::default();
//! let coordinator = SyncCoordinator::from_config(ViewKind::ByCity, &config).await?;
//!
//! coordinator.activate().await?;
//! for sector in coordinator.sorted_sectors() {
//!     println!("{} ({})", sector.sector, sector.count);
//! }
//! assert!(!coordinator.phase().is_busy());
//! # Ok(())
//! # }
//! ```

mod correction;
mod delta;
mod lifecycle;
mod types;

pub use types::{SyncError, SyncOutcome, SyncPhase};

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::dataset::{DatasetKey, ViewKind};
use crate::index::{
    BucketSummary, CityProjection, Fingerprint, MarkerHandle, MarkerIndex, MarkerOp, MarkerStats,
    SectorSummary,
};
use crate::persistence::{InMemorySnapshotStore, PersistedSnapshot, SnapshotStore, SqliteSnapshotStore};
use crate::record::{Record, RecordId};
use crate::sector::SectorTag;
use crate::store::{Authoritative, PruneOutcome, RecordStore, UpsertReport};
use crate::transport::{ClientsApi, HttpClientsApi, TransportError, UnmappedClient};
use crate::watermark::Watermark;

/// Everything derived from one dataset key.
#[derive(Debug)]
pub(super) struct ViewState {
    pub(super) key: DatasetKey,
    pub(super) store: RecordStore,
    pub(super) markers: MarkerIndex,
    /// Clients the map listing reported without coordinates
    pub(super) missing: Vec<UnmappedClient>,
    /// Marker mutations not yet taken by the renderer
    pub(super) pending_ops: Vec<MarkerOp>,
    /// Map records the hierarchy cannot place (blank city)
    pub(super) unplaced: BTreeMap<RecordId, Record>,
}

impl ViewState {
    fn new(key: DatasetKey) -> Self {
        Self {
            key,
            store: RecordStore::new(),
            markers: MarkerIndex::new(),
            missing: Vec::new(),
            pending_ops: Vec::new(),
            unplaced: BTreeMap::new(),
        }
    }

    /// Every record the view shows, placed in the hierarchy or not.
    pub(super) fn records(&self) -> impl Iterator<Item = &Record> {
        self.store.records().chain(self.unplaced.values())
    }

    pub(super) fn len(&self) -> usize {
        self.store.len() + self.unplaced.len()
    }

    pub(super) fn get(&self, id: &str) -> Option<&Record> {
        self.store.get(id).or_else(|| self.unplaced.get(id))
    }

    /// Replace all records and the watermark.
    pub(super) fn bootstrap(&mut self, records: Vec<Record>, watermark: Option<Watermark>) -> UpsertReport {
        self.unplaced.clear();
        let (records, held) = self.hold_unplaced(records);
        let mut report = self.store.bootstrap(records, watermark);
        report.inserted += held.inserted;
        report.updated += held.updated;
        report
    }

    pub(super) fn apply_upserts(&mut self, records: Vec<Record>) -> UpsertReport {
        let (records, held) = self.hold_unplaced(records);
        let mut report = self.store.apply_upserts(records);
        report.inserted += held.inserted;
        report.updated += held.updated;
        report
    }

    /// Map view: move cityless records into `unplaced` (only the hierarchy
    /// needs a city) and return the rest for the store.
    fn hold_unplaced(&mut self, records: Vec<Record>) -> (Vec<Record>, UpsertReport) {
        let mut held = UpsertReport::default();
        if self.key.view != ViewKind::Map {
            return (records, held);
        }

        let mut placeable = Vec::with_capacity(records.len());
        for record in records {
            if record.index_city().is_some() {
                self.unplaced.remove(&record.id);
                placeable.push(record);
                continue;
            }
            let existed = self.store.remove(&record.id).is_some() || self.unplaced.contains_key(&record.id);
            if existed {
                held.updated += 1;
            } else {
                held.inserted += 1;
            }
            self.unplaced.insert(record.id.clone(), record);
        }
        (placeable, held)
    }

    /// Prune the store and the unplaced records against one id set.
    pub(super) fn prune_deleted(&mut self, authoritative: &Authoritative) -> PruneOutcome {
        let mut outcome = self.store.prune_deleted(authoritative);
        if let (PruneOutcome::Pruned(removed), Authoritative::Complete(ids)) = (&mut outcome, authoritative) {
            let gone: Vec<RecordId> = self.unplaced.keys().filter(|id| !ids.contains(*id)).cloned().collect();
            for id in gone {
                self.unplaced.remove(&id);
                removed.push(id);
            }
            removed.sort();
        }
        outcome
    }

    /// Records sorted by id, as persisted.
    pub(super) fn snapshot(&self) -> Vec<Record> {
        let mut records = self.store.snapshot();
        records.extend(self.unplaced.values().cloned());
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Bring markers in line with the records (map view only).
    pub(super) fn refresh_markers(&mut self) {
        if self.key.view != ViewKind::Map {
            return;
        }
        let diff = self.markers.reconcile(self.store.records().chain(self.unplaced.values()));
        if !diff.is_empty() {
            debug!(
                creates = diff.creates(),
                moves = diff.moves(),
                refreshes = diff.refreshes(),
                removes = diff.removes(),
                unchanged = diff.unchanged,
                "Markers reconciled"
            );
        }
        crate::metrics::record_marker_diff(&diff);
        let stats = self.markers.stats();
        crate::metrics::set_marker_stats(stats.markers, stats.unmapped);
        self.pending_ops.extend(diff.ops);
    }
}

/// Sync driver for one mounted view.
///
/// All methods take `&self`; share it behind an `Arc` between the UI task
/// and whatever triggers reloads.
pub struct SyncCoordinator {
    pub(super) api: Arc<dyn ClientsApi>,
    pub(super) snapshots: Arc<dyn SnapshotStore>,

    /// Records, indexes and the active dataset key
    pub(super) state: RwLock<ViewState>,

    /// Current phase (broadcast to watchers)
    pub(super) phase: watch::Sender<SyncPhase>,
    pub(super) phase_rx: watch::Receiver<SyncPhase>,

    /// Bumped whenever in-flight results must be discarded
    pub(super) generation: AtomicU64,

    /// Bumped when the loaded dataset is discarded (teardown, filter switch)
    pub(super) epoch: AtomicU64,

    /// Generation owning the in-flight sequence, if any
    pub(super) in_flight: Mutex<Option<u64>>,

    /// Serializes snapshot writes so an older pair never lands last
    pub(super) persist_lock: tokio::sync::Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        view: ViewKind,
        frequent_only: bool,
        api: Arc<dyn ClientsApi>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let (phase, phase_rx) = watch::channel(SyncPhase::Idle);
        Self {
            api,
            snapshots,
            state: RwLock::new(ViewState::new(DatasetKey::new(view, frequent_only))),
            phase,
            phase_rx,
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the HTTP adapter and snapshot backend from `config`.
    pub async fn from_config(view: ViewKind, config: &SyncConfig) -> Result<Self, SyncError> {
        let api: Arc<dyn ClientsApi> = Arc::new(HttpClientsApi::from_config(config)?);
        let snapshots: Arc<dyn SnapshotStore> = match &config.snapshot_db_path {
            Some(path) => Arc::new(SqliteSnapshotStore::open(path).await?),
            None => {
                info!("No snapshot path configured, snapshots kept in memory");
                Arc::new(InMemorySnapshotStore::new())
            }
        };
        Ok(Self::new(view, config.frequent_only, api, snapshots))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Read side
    // ═══════════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn view(&self) -> ViewKind {
        self.state.read().key.view
    }

    #[must_use]
    pub fn key(&self) -> DatasetKey {
        self.state.read().key
    }

    #[must_use]
    pub fn frequent_only(&self) -> bool {
        self.state.read().key.frequent_only
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.phase_rx.borrow()
    }

    /// Subscribe to phase changes.
    #[must_use]
    pub fn phase_receiver(&self) -> watch::Receiver<SyncPhase> {
        self.phase_rx.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn watermark(&self) -> Option<Watermark> {
        self.state.read().store.watermark().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn record(&self, id: &str) -> Option<Record> {
        self.state.read().get(id).cloned()
    }

    /// Run `f` against the store under the read lock.
    ///
    /// Map records without a city are not in the store; see
    /// [`unplaced`](Self::unplaced).
    pub fn with_store<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> R {
        f(&self.state.read().store)
    }

    /// City → record ids.
    #[must_use]
    pub fn projection(&self) -> CityProjection {
        self.state.read().store.project()
    }

    #[must_use]
    pub fn sorted_sectors(&self) -> Vec<SectorSummary> {
        self.state.read().store.index().sorted_sectors()
    }

    #[must_use]
    pub fn sorted_buckets(&self, sector: SectorTag) -> Vec<BucketSummary> {
        self.state.read().store.index().sorted_buckets(sector)
    }

    /// Current marker handles, sorted by id.
    #[must_use]
    pub fn markers(&self) -> Vec<MarkerHandle> {
        let state = self.state.read();
        let mut markers: Vec<MarkerHandle> = state.markers.markers().cloned().collect();
        markers.sort_by(|a, b| a.id.cmp(&b.id));
        markers
    }

    #[must_use]
    pub fn marker_stats(&self) -> MarkerStats {
        self.state.read().markers.stats()
    }

    /// Stored records that have no usable coordinates.
    #[must_use]
    pub fn unmapped(&self) -> Vec<RecordId> {
        self.state.read().markers.unmapped().iter().cloned().collect()
    }

    /// Map records kept outside the hierarchy because they have no city.
    #[must_use]
    pub fn unplaced(&self) -> Vec<Record> {
        self.state.read().unplaced.values().cloned().collect()
    }

    /// Clients the server could not place on the map.
    #[must_use]
    pub fn missing_clients(&self) -> Vec<UnmappedClient> {
        self.state.read().missing.clone()
    }

    /// Drain the marker mutations produced since the last call, in order.
    pub fn take_marker_ops(&self) -> Vec<MarkerOp> {
        std::mem::take(&mut self.state.write().pending_ops)
    }

    /// Fingerprint of the visible marker set.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        MarkerIndex::fingerprint(self.state.read().records())
    }

    /// Whether the renderer is behind the current marker set.
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        let state = self.state.read();
        let fingerprint = MarkerIndex::fingerprint(state.records());
        state.markers.needs_rebuild(&fingerprint)
    }

    /// Record that the renderer now shows `fingerprint`.
    pub fn mark_rendered(&self, fingerprint: Fingerprint) {
        self.state.write().markers.mark_rendered(fingerprint);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sequence bookkeeping
    // ═══════════════════════════════════════════════════════════════════════

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Claim the single-flight guard, or `None` if a sequence owns it.
    pub(super) fn begin(&self) -> Option<u64> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.is_some() {
            return None;
        }
        let generation = self.bump();
        *in_flight = Some(generation);
        Some(generation)
    }

    /// Take the guard from whoever holds it; their results become stale.
    pub(super) fn preempt(&self) -> u64 {
        let mut in_flight = self.in_flight.lock();
        let generation = self.bump();
        *in_flight = Some(generation);
        generation
    }

    /// Invalidate everything in flight, release the guard and start a new
    /// dataset epoch.
    pub(super) fn invalidate(&self) -> u64 {
        let mut in_flight = self.in_flight.lock();
        *in_flight = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.bump()
    }

    pub(super) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(super) fn finish(&self, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if *in_flight == Some(generation) {
            *in_flight = None;
        }
    }

    pub(super) fn set_phase(&self, generation: u64, phase: SyncPhase) {
        if !self.is_current(generation) {
            return;
        }
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "Phase transition");
            crate::metrics::record_phase(&phase.to_string());
        }
    }

    /// Apply `f` to the state if `generation` is still current.
    pub(super) fn commit<R>(&self, generation: u64, f: impl FnOnce(&mut ViewState) -> R) -> Option<R> {
        let mut state = self.state.write();
        if !self.is_current(generation) {
            crate::metrics::record_superseded(state.key.view);
            debug!(generation, "Discarding superseded result");
            return None;
        }
        let result = f(&mut state);
        crate::metrics::set_records(state.key.view, state.len());
        Some(result)
    }

    /// A background step failed: keep the data, mark the view stale.
    pub(super) fn absorb(&self, generation: u64, step: &str, err: &TransportError) -> SyncOutcome {
        if !self.is_current(generation) {
            return SyncOutcome::Superseded;
        }
        warn!(step, error = %err, "Background sync step failed, keeping last good data");
        crate::metrics::record_error("transport", step, err.kind());
        self.set_phase(generation, SyncPhase::Stale);
        SyncOutcome::Stale
    }

    /// Save the current `(snapshot, watermark)` pair.
    ///
    /// Skipped without a server watermark. Failures are logged and counted;
    /// the in-memory state stays authoritative.
    pub(super) async fn persist(&self, generation: u64) -> bool {
        let _guard = self.persist_lock.lock().await;
        if !self.is_current(generation) {
            return false;
        }

        let (key, snapshot) = {
            let state = self.state.read();
            let Some(watermark) = state.store.watermark().cloned() else {
                debug!(key = %state.key, "No server watermark yet, not persisting");
                return false;
            };
            (state.key, PersistedSnapshot::new(state.snapshot(), watermark))
        };

        match self.snapshots.save(&key, &snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist snapshot");
                crate::metrics::record_error("persistence", "save", "backend");
                false
            }
        }
    }
}
