// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dataset identity: which view, under which filter.

use serde::{Deserialize, Serialize};

/// The two projections the engine keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Geography-grouped list backed by the hierarchical index.
    ByCity,
    /// Marker layer backed by the marker index.
    Map,
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByCity => write!(f, "by_city"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// Key of one persisted snapshot.
///
/// The filter predicate is part of the key, so toggling "frequent only"
/// switches between two cache slots instead of overwriting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub view: ViewKind,
    pub frequent_only: bool,
}

impl DatasetKey {
    #[must_use]
    pub fn new(view: ViewKind, frequent_only: bool) -> Self {
        Self { view, frequent_only }
    }

    /// Stable string form used as the storage key.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let filter = if self.frequent_only { "frequent" } else { "all" };
        format!("clients.{}.{}", self.view, filter)
    }
}

impl std::fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}
