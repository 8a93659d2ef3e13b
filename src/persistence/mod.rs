// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable `(snapshot, watermark)` storage per dataset.
//!
//! - [`SnapshotStore`]: the boundary trait the coordinator talks to
//! - [`InMemorySnapshotStore`]: process-local backend (tests, ephemeral sessions)
//! - [`SqliteSnapshotStore`]: on-device SQLite file

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::InMemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;
pub use traits::{PersistedSnapshot, PersistenceError, SnapshotStore};
