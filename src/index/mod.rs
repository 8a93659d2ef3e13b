// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Derived projections over the record store.
//!
//! - [`hierarchy`]: sector → city → district tree used by the list view
//! - [`markers`]: flat id → marker map used by the map view

pub mod hierarchy;
pub mod markers;

pub use hierarchy::{
    BucketKind, BucketSummary, CityNode, CityProjection, HierarchicalIndex, IndexPath, Leaf,
    SectorNode, SectorSummary,
};
pub use markers::{Fingerprint, MarkerContent, MarkerDiff, MarkerHandle, MarkerIndex, MarkerOp, MarkerStats};
