// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Single-record address correction.

use tracing::{info, warn};

use crate::record::Record;
use crate::transport::TransportError;

use super::{SyncCoordinator, SyncError, SyncPhase};

const UPDATE_STEP: &str = "update_single_client";

impl SyncCoordinator {
    /// Send a corrected address and relocate the record to wherever the
    /// server placed it.
    ///
    /// The server's answer is a whole record, so it is applied even if a
    /// delta check or reload started meanwhile. Only a teardown or filter
    /// switch during the request discards it, with
    /// [`SyncError::CorrectionDiscarded`].
    ///
    /// The watermark is left alone: the view becomes [`SyncPhase::Stale`]
    /// until the next delta check confirms a server watermark. On failure
    /// the store is untouched and the error's
    /// [`requires_reload`](SyncError::requires_reload) is set.
    #[tracing::instrument(skip(self, new_address))]
    pub async fn correct_address(&self, id: &str, new_address: &str) -> Result<Record, SyncError> {
        let new_address = new_address.trim();
        if new_address.is_empty() {
            return Err(SyncError::InvalidAddress);
        }
        if self.state.read().get(id).is_none() {
            return Err(SyncError::UnknownRecord(id.to_string()));
        }

        let epoch = self.epoch();
        let corrected = match self.api.update_single_client(id, new_address).await {
            Ok(corrected) => corrected,
            Err(source) => {
                warn!(error = %source, "Address correction failed");
                crate::metrics::record_correction(false);
                crate::metrics::record_error("transport", UPDATE_STEP, source.kind());
                return Err(SyncError::CorrectionFailed { id: id.to_string(), source });
            }
        };

        let mut record = corrected.into_record();
        record.id = id.to_string();

        let replaced = {
            let mut state = self.state.write();
            if self.epoch() != epoch {
                None
            } else {
                let path = state.store.replace_record(record.clone());
                if path.is_some() {
                    state.unplaced.remove(id);
                    state.refresh_markers();
                    crate::metrics::set_records(state.key.view, state.len());
                }
                Some(path)
            }
        };
        let path = match replaced {
            None => {
                warn!("View changed during correction, not applying it locally");
                crate::metrics::record_correction(false);
                return Err(SyncError::CorrectionDiscarded(id.to_string()));
            }
            Some(None) => {
                crate::metrics::record_correction(false);
                return Err(SyncError::CorrectionFailed {
                    id: id.to_string(),
                    source: TransportError::Decode {
                        endpoint: UPDATE_STEP.to_string(),
                        reason: "corrected record has no city".to_string(),
                    },
                });
            }
            Some(Some(path)) => path,
        };

        crate::metrics::record_correction(true);
        info!(sector = %path.sector(), city = %record.city, "Record relocated");

        // A running sequence owns the phase and persists when it finishes
        let generation = self.generation();
        if self.in_flight.lock().is_none() {
            self.set_phase(generation, SyncPhase::Stale);
        }
        self.persist(generation).await;
        Ok(record)
    }
}
