// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Client Sync
//!
//! Client-side incremental sync and hierarchical aggregation for a remote
//! client record set, backing a geography-grouped list and a map layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                        │
//! │  • Phase state machine, broadcast over a watch channel     │
//! │  • Generation counter discards superseded results          │
//! │  • Single in-flight sequence per view                      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │   ClientsApi    │  │   RecordStore    │  │  SnapshotStore   │
//! │  delta, lists,  │  │  records +       │  │  (snapshot,      │
//! │  correction     │  │  watermark +     │  │   watermark)     │
//! │  (reqwest)      │  │  indexes         │  │  (SQLite/memory) │
//! └─────────────────┘  └──────────────────┘  └──────────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                ▼                              ▼
//!      ┌───────────────────┐          ┌───────────────────┐
//!      │ HierarchicalIndex │          │    MarkerIndex    │
//!      │ sector → city →   │          │ id → marker, diff │
//!      │ district → ids    │          │ and fingerprint   │
//!      └───────────────────┘          └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use client_sync::{SyncConfig, SyncCoordinator, SectorTag, ViewKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client_sync::SyncError> {
//!     let config = SyncConfig {
//!         base_url: "https://crm.example.com/api".into(),
//!         snapshot_db_path: Some("client_snapshots.db".into()),
//!         ..Default::default()
//!     };
//!
//!     let list = SyncCoordinator::from_config(ViewKind::ByCity, &config).await?;
//!
//!     // Renders the cached snapshot immediately, then applies the delta
//!     list.activate().await?;
//!
//!     for bucket in list.sorted_buckets(SectorTag::Laval) {
//!         println!("{}: {}", bucket.name, bucket.count);
//!     }
//!
//!     // Relocate one record after an address fix
//!     if let Err(e) = list.correct_address("c-42", "1600 boul. Le Corbusier, Laval").await {
//!         if e.requires_reload() {
//!             list.force_reload().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Cache-first activation**: the persisted pair renders before any network call
//! - **Incremental apply**: upserts relocate records in the index, never rebuild it
//! - **Deletion reconciliation**: guarded against empty or failed id listings
//! - **Server watermarks only**: the local clock never advances the cache
//! - **Marker diffing**: create/move/refresh/remove only what changed
//! - **Retry Logic**: backoff on idempotent server reads
//!
//! ## Configuration
//!
//! See [`SyncConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncCoordinator`] state machine
//! - [`store`]: Records, watermark and the hierarchical index
//! - [`index`]: Hierarchical and marker indexes
//! - [`sector`]: City → sector classification
//! - [`persistence`]: Snapshot backends (SQLite, memory)
//! - [`transport`]: Server boundary and HTTP adapter
//! - [`resilience`]: Retry logic

pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod index;
pub mod metrics;
pub mod persistence;
pub mod record;
pub mod resilience;
pub mod sector;
pub mod store;
pub mod transport;
pub mod watermark;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncError, SyncOutcome, SyncPhase};
pub use dataset::{DatasetKey, ViewKind};
pub use index::{
    BucketKind, BucketSummary, CityProjection, Fingerprint, HierarchicalIndex, IndexPath,
    MarkerDiff, MarkerHandle, MarkerIndex, MarkerOp, MarkerStats, SectorSummary,
};
pub use persistence::{
    InMemorySnapshotStore, PersistedSnapshot, PersistenceError, SnapshotStore, SqliteSnapshotStore,
};
pub use record::{Coordinates, Location, Record, RecordId};
pub use resilience::retry::RetryConfig;
pub use sector::{classify, SectorTag};
pub use store::{Authoritative, PruneOutcome, PruneRefusal, RecordStore, UpsertReport};
pub use transport::{
    ChangeSet, ClientsApi, CorrectedClient, HierarchicalSnapshot, HttpClientsApi, MapListing,
    TransportError, UnmappedClient,
};
pub use watermark::Watermark;
