// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Server boundary.
//!
//! [`ClientsApi`] is what the coordinator talks to; [`HttpClientsApi`] is
//! the production adapter. Every method returns domain types: envelope
//! checks (`success: false`) happen in the adapter.

pub mod http;
pub mod types;

pub use http::HttpClientsApi;
pub use types::{
    ChangeSet, CitySnapshot, CorrectedClient, HierarchicalSnapshot, MapListing, SectorSnapshot,
    UnmappedClient,
};

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::dataset::ViewKind;
use crate::record::RecordId;
use crate::watermark::Watermark;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error on {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },
    #[error("Server returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("Server reported failure on {endpoint}: {message}")]
    Unsuccessful { endpoint: String, message: String },
    #[error("Malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl TransportError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Status { .. } => "status",
            Self::Unsuccessful { .. } => "unsuccessful",
            Self::Decode { .. } => "decode",
        }
    }

    /// Whether sending the same request again may succeed: connection
    /// failures and server-side (5xx) statuses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unsuccessful { .. } | Self::Decode { .. } => false,
        }
    }
}

/// Read and correction endpoints of the client server.
#[async_trait]
pub trait ClientsApi: Send + Sync {
    /// Full hierarchical listing.
    async fn by_city(&self, frequent_only: bool) -> Result<HierarchicalSnapshot, TransportError>;

    /// Records changed since `since`, plus the server's current watermark.
    async fn changes_since(&self, since: &Watermark) -> Result<ChangeSet, TransportError>;

    /// Flat listing with coordinates, plus the clients that have none.
    async fn for_map(&self, frequent_only: bool) -> Result<MapListing, TransportError>;

    /// Server's current watermark, `None` if it has never recorded one.
    async fn last_update(&self) -> Result<Option<Watermark>, TransportError>;

    /// Submit a corrected address; the server geocodes and re-sectors.
    async fn update_single_client(
        &self,
        id: &str,
        new_address: &str,
    ) -> Result<CorrectedClient, TransportError>;

    /// Complete id set of a view under a filter, used for deletion
    /// reconciliation.
    async fn authoritative_ids(
        &self,
        view: ViewKind,
        frequent_only: bool,
    ) -> Result<HashSet<RecordId>, TransportError> {
        match view {
            ViewKind::ByCity => Ok(self.by_city(frequent_only).await?.record_ids()),
            ViewKind::Map => Ok(self.for_map(frequent_only).await?.record_ids()),
        }
    }
}
