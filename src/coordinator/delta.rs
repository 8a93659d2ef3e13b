// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delta check, incremental apply and deletion reconciliation.

use tracing::{debug, info, warn};

use crate::dataset::ViewKind;
use crate::metrics::SequenceTimer;
use crate::store::{Authoritative, PruneOutcome};
use crate::watermark::Watermark;

use super::{SyncCoordinator, SyncError, SyncOutcome, SyncPhase};

impl SyncCoordinator {
    /// By-city view: ask for changes since the cached watermark.
    ///
    /// The server's `last_update` is adopted only once upserts and the
    /// deletion pass have both been committed.
    pub(super) async fn check_by_city(&self, generation: u64) -> Result<SyncOutcome, SyncError> {
        let _timer = SequenceTimer::new(ViewKind::ByCity, "delta");
        self.set_phase(generation, SyncPhase::CheckingDelta);

        let Some(since) = self.watermark() else {
            return self.full_load(generation).await;
        };

        let changes = match self.api.changes_since(&since).await {
            Ok(changes) => changes,
            Err(e) => return Ok(self.absorb(generation, "changes_since", &e)),
        };
        if !self.is_current(generation) {
            return Ok(SyncOutcome::Superseded);
        }

        if !changes.has_changes {
            let advanced = self.adopt_watermark(generation, changes.last_update.as_ref());
            let Some(advanced) = advanced else {
                return Ok(SyncOutcome::Superseded);
            };
            if advanced {
                self.persist(generation).await;
            }
            self.set_phase(generation, SyncPhase::Fresh);
            debug!(since = %since, "No changes");
            return Ok(SyncOutcome::Fresh);
        }

        let upserts = match changes.upserts() {
            Some(records) => {
                self.set_phase(generation, SyncPhase::ApplyingDelta);
                let report = self.commit(generation, |state| state.apply_upserts(records.to_vec()));
                let Some(report) = report else {
                    return Ok(SyncOutcome::Superseded);
                };
                crate::metrics::record_upserts(ViewKind::ByCity, report.applied());
                info!(
                    inserted = report.inserted,
                    relocated = report.relocated,
                    updated = report.updated,
                    skipped = report.skipped,
                    "Applied delta"
                );
                report.applied()
            }
            None => {
                self.set_phase(generation, SyncPhase::DeletionOnly);
                0
            }
        };

        self.set_phase(generation, SyncPhase::ReconcilingDeletions);
        let frequent_only = self.frequent_only();
        let authoritative = match self.api.authoritative_ids(ViewKind::ByCity, frequent_only).await {
            Ok(ids) => Authoritative::Complete(ids),
            Err(e) => {
                warn!(error = %e, "Could not fetch authoritative ids");
                crate::metrics::record_error("transport", "authoritative_ids", e.kind());
                Authoritative::Unavailable
            }
        };

        self.finish_delta(generation, ViewKind::ByCity, upserts, &authoritative, changes.last_update.as_ref())
            .await
    }

    /// Map view: compare the server watermark with the cached one and, if
    /// they differ, re-apply the map listing.
    pub(super) async fn check_map(&self, generation: u64) -> Result<SyncOutcome, SyncError> {
        let _timer = SequenceTimer::new(ViewKind::Map, "delta");
        self.set_phase(generation, SyncPhase::CheckingDelta);

        let server = match self.api.last_update().await {
            Ok(server) => server,
            Err(e) => return Ok(self.absorb(generation, "last_update", &e)),
        };
        if !self.is_current(generation) {
            return Ok(SyncOutcome::Superseded);
        }

        let cached = self.watermark();
        if server.is_some() && server == cached {
            self.set_phase(generation, SyncPhase::Fresh);
            debug!("Map cache matches server watermark");
            return Ok(SyncOutcome::Fresh);
        }

        self.set_phase(generation, SyncPhase::ApplyingDelta);
        let frequent_only = self.frequent_only();
        let listing = match self.api.for_map(frequent_only).await {
            Ok(listing) => listing,
            Err(e) => return Ok(self.absorb(generation, "for_map", &e)),
        };

        let authoritative = Authoritative::Complete(listing.record_ids());
        let missing = listing.missing_clients;
        let report = self.commit(generation, |state| {
            state.missing = missing;
            state.apply_upserts(listing.clients)
        });
        let Some(report) = report else {
            return Ok(SyncOutcome::Superseded);
        };
        crate::metrics::record_upserts(ViewKind::Map, report.applied());

        self.set_phase(generation, SyncPhase::ReconcilingDeletions);
        self.finish_delta(generation, ViewKind::Map, report.applied(), &authoritative, server.as_ref())
            .await
    }

    /// Prune, adopt the server watermark, refresh markers and persist, as
    /// one commit.
    ///
    /// When the prune is refused the upserts stay applied but the watermark
    /// is left alone, so the next check repeats the sequence.
    async fn finish_delta(
        &self,
        generation: u64,
        view: ViewKind,
        upserts: usize,
        authoritative: &Authoritative,
        last_update: Option<&Watermark>,
    ) -> Result<SyncOutcome, SyncError> {
        let outcome = self.commit(generation, |state| {
            let outcome = state.prune_deleted(authoritative);
            if let (PruneOutcome::Pruned(_), Some(watermark)) = (&outcome, last_update) {
                state.store.set_watermark(watermark.clone());
            }
            state.refresh_markers();
            outcome
        });
        let Some(outcome) = outcome else {
            return Ok(SyncOutcome::Superseded);
        };

        self.persist(generation).await;

        match outcome {
            PruneOutcome::Pruned(removed) => {
                crate::metrics::record_prune(view, removed.len(), None);
                if !removed.is_empty() {
                    info!(removed = removed.len(), "Removed deleted records");
                }
                let phase = if last_update.is_some() { SyncPhase::Fresh } else { SyncPhase::Stale };
                self.set_phase(generation, phase);
                Ok(SyncOutcome::Applied { upserts, removed: removed.len() })
            }
            PruneOutcome::Refused(reason) => {
                crate::metrics::record_prune(view, 0, Some(&reason.to_string()));
                warn!(reason = %reason, upserts, "Deletion pass refused, watermark not advanced");
                self.set_phase(generation, SyncPhase::Stale);
                Ok(SyncOutcome::Stale)
            }
        }
    }

    /// Take the server's watermark if it sent one.
    ///
    /// `None` when superseded, otherwise whether the watermark changed.
    fn adopt_watermark(&self, generation: u64, last_update: Option<&Watermark>) -> Option<bool> {
        self.commit(generation, |state| match last_update {
            Some(watermark) if state.store.watermark() != Some(watermark) => {
                state.store.set_watermark(watermark.clone());
                true
            }
            _ => false,
        })
    }
}
