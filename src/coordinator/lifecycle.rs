// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! View lifecycle: activation, full load, forced reload, filter switch,
//! teardown.

use tracing::{debug, error, info, warn};

use crate::dataset::{DatasetKey, ViewKind};
use crate::metrics::SequenceTimer;
use crate::record::Record;
use crate::transport::{TransportError, UnmappedClient};

use super::{SyncCoordinator, SyncError, SyncOutcome, SyncPhase, ViewState};

/// Everything a full load fetched for one view.
struct FullDataset {
    records: Vec<Record>,
    missing: Vec<UnmappedClient>,
}

impl SyncCoordinator {
    /// Mount the view: show the cached snapshot, then bring it up to date.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] if a sequence is in flight.
    /// Errors only when there is nothing to show and the full load failed.
    #[tracing::instrument(skip(self), fields(key = %self.key()))]
    pub async fn activate(&self) -> Result<SyncOutcome, SyncError> {
        let Some(generation) = self.begin() else {
            debug!("Sync already in flight");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let result = self.run_activation(generation).await;
        self.finish(generation);
        self.record_result("activate", &result);
        result
    }

    /// Drop everything in flight and reload the whole dataset.
    #[tracing::instrument(skip(self), fields(key = %self.key()))]
    pub async fn force_reload(&self) -> Result<SyncOutcome, SyncError> {
        let generation = self.preempt();
        info!(generation, "Forced reload");

        let result = self.full_load(generation).await;
        self.finish(generation);
        self.record_result("force_reload", &result);
        result
    }

    /// Switch the "frequent clients only" filter and activate its dataset.
    ///
    /// Each filter value has its own cache slot, so switching back and
    /// forth does not refetch when both are cached.
    #[tracing::instrument(skip(self))]
    pub async fn set_frequent_only(&self, frequent_only: bool) -> Result<SyncOutcome, SyncError> {
        let key = {
            let state = self.state.read();
            DatasetKey::new(state.key.view, frequent_only)
        };
        if key == self.key() {
            return self.activate().await;
        }

        let generation = self.invalidate();
        *self.state.write() = ViewState::new(key);
        self.phase.send_replace(SyncPhase::Idle);
        info!(key = %key, generation, "Filter switched");

        self.activate().await
    }

    /// Unmount: discard in-flight results and go idle.
    ///
    /// Loaded data is kept so a remount renders immediately.
    pub fn teardown(&self) {
        let generation = self.invalidate();
        self.phase.send_replace(SyncPhase::Idle);
        debug!(generation, "View torn down");
    }

    async fn run_activation(&self, generation: u64) -> Result<SyncOutcome, SyncError> {
        self.set_phase(generation, SyncPhase::Bootstrapping);

        let (key, warm) = {
            let state = self.state.read();
            (state.key, state.store.watermark().is_some())
        };

        if !warm {
            match self.snapshots.load(&key).await {
                Ok(Some(snapshot)) => {
                    let records = snapshot.records.len();
                    let committed = self.commit(generation, |state| {
                        state.bootstrap(snapshot.records, Some(snapshot.watermark));
                        state.refresh_markers();
                    });
                    if committed.is_none() {
                        return Ok(SyncOutcome::Superseded);
                    }
                    info!(records, "Bootstrapped from cache");
                }
                Ok(None) => {
                    debug!("No usable cache");
                    return self.full_load(generation).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read cache, falling back to full load");
                    crate::metrics::record_error("persistence", "load", "backend");
                    return self.full_load(generation).await;
                }
            }
        }

        match key.view {
            ViewKind::ByCity => self.check_by_city(generation).await,
            ViewKind::Map => self.check_map(generation).await,
        }
    }

    /// Fetch the server watermark, then the dataset, then replace local
    /// state and persist.
    ///
    /// The watermark is fetched first so the snapshot is never newer than
    /// the watermark saved with it.
    pub(super) async fn full_load(&self, generation: u64) -> Result<SyncOutcome, SyncError> {
        let key = self.key();
        let _timer = SequenceTimer::new(key.view, "full_load");
        self.set_phase(generation, SyncPhase::FullLoad);

        let watermark = match self.api.last_update().await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %e, "Could not fetch server watermark, data will not be cached");
                crate::metrics::record_error("transport", "last_update", e.kind());
                None
            }
        };

        let dataset = match self.fetch_dataset(key).await {
            Ok(dataset) => dataset,
            Err(e) => {
                if !self.is_current(generation) {
                    return Ok(SyncOutcome::Superseded);
                }
                crate::metrics::record_error("transport", "full_load", e.kind());
                if self.is_empty() {
                    error!(error = %e, "Full load failed with nothing to show");
                    self.set_phase(generation, SyncPhase::Error);
                } else {
                    warn!(error = %e, "Full load failed, keeping last good data");
                    self.set_phase(generation, SyncPhase::Stale);
                }
                return Err(e.into());
            }
        };

        let confirmed = watermark.is_some();
        let committed = self.commit(generation, |state| {
            let report = state.bootstrap(dataset.records, watermark);
            state.missing = dataset.missing;
            state.refresh_markers();
            if report.skipped > 0 {
                debug!(skipped = report.skipped, "Dataset loaded with unindexable records");
            }
            state.len()
        });
        let Some(records) = committed else {
            return Ok(SyncOutcome::Superseded);
        };

        if confirmed {
            self.persist(generation).await;
            self.set_phase(generation, SyncPhase::Fresh);
        } else {
            self.set_phase(generation, SyncPhase::Stale);
        }
        info!(records, confirmed, "Full load complete");
        Ok(SyncOutcome::Loaded { records })
    }

    async fn fetch_dataset(&self, key: DatasetKey) -> Result<FullDataset, TransportError> {
        match key.view {
            ViewKind::ByCity => {
                let records = self.api.by_city(key.frequent_only).await?.into_records();
                Ok(FullDataset { records, missing: Vec::new() })
            }
            ViewKind::Map => {
                let listing = self.api.for_map(key.frequent_only).await?;
                Ok(FullDataset {
                    records: listing.clients,
                    missing: listing.missing_clients,
                })
            }
        }
    }

    fn record_result(&self, kind: &str, result: &Result<SyncOutcome, SyncError>) {
        let outcome = match result {
            Ok(outcome) => outcome.to_string(),
            Err(_) => "error".to_string(),
        };
        crate::metrics::record_sequence(self.view(), kind, &outcome);
    }
}
