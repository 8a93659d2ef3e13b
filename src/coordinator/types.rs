// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync coordinator.

use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::record::RecordId;
use crate::transport::TransportError;

/// Sync phase of one mounted view.
///
/// Broadcast over a watch channel; see
/// [`super::SyncCoordinator::phase_receiver()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not mounted
    Idle,
    /// Loading the persisted snapshot
    Bootstrapping,
    /// Fetching the whole dataset (no usable cache, or forced)
    FullLoad,
    /// Asking the server what changed since the cached watermark
    CheckingDelta,
    /// Applying upserted records
    ApplyingDelta,
    /// Server reported changes but sent no upserts
    DeletionOnly,
    /// Diffing against the server's authoritative id set
    ReconcilingDeletions,
    /// Consistent with a server-confirmed watermark
    Fresh,
    /// Showing last good data; the server has not confirmed it
    Stale,
    /// Nothing to show and the last load failed
    Error,
}

impl SyncPhase {
    /// Whether a sequence is running in this phase.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Bootstrapping
                | Self::FullLoad
                | Self::CheckingDelta
                | Self::ApplyingDelta
                | Self::DeletionOnly
                | Self::ReconcilingDeletions
        )
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Bootstrapping => write!(f, "Bootstrapping"),
            Self::FullLoad => write!(f, "FullLoad"),
            Self::CheckingDelta => write!(f, "CheckingDelta"),
            Self::ApplyingDelta => write!(f, "ApplyingDelta"),
            Self::DeletionOnly => write!(f, "DeletionOnly"),
            Self::ReconcilingDeletions => write!(f, "ReconcilingDeletions"),
            Self::Fresh => write!(f, "Fresh"),
            Self::Stale => write!(f, "Stale"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// How a sync sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cache already matched the server.
    Fresh,
    /// A delta was applied.
    Applied { upserts: usize, removed: usize },
    /// The whole dataset was (re)loaded.
    Loaded { records: usize },
    /// Last good data kept; a background step failed or was refused.
    Stale,
    /// Another sequence owns this view.
    AlreadyRunning,
    /// A newer sequence started; this one's results were discarded.
    Superseded,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Applied { .. } => write!(f, "applied"),
            Self::Loaded { .. } => write!(f, "loaded"),
            Self::Stale => write!(f, "stale"),
            Self::AlreadyRunning => write!(f, "already_running"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Unknown record '{0}'")]
    UnknownRecord(RecordId),
    #[error("Address must not be blank")]
    InvalidAddress,
    #[error("Address correction for '{id}' failed: {source}")]
    CorrectionFailed {
        id: RecordId,
        #[source]
        source: TransportError,
    },
    /// The server accepted the correction but the view's dataset was
    /// discarded (teardown or filter switch) before it could be applied.
    #[error("Address correction for '{0}' was accepted but the view changed before it was applied")]
    CorrectionDiscarded(RecordId),
    #[error("Superseded by a newer sync sequence")]
    Superseded,
}

impl SyncError {
    /// Whether the caller should fall back to a full reload.
    #[must_use]
    pub fn requires_reload(&self) -> bool {
        matches!(self, Self::CorrectionFailed { .. } | Self::CorrectionDiscarded(_))
    }
}
