// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flat id → marker projection for the map view.
//!
//! The index owns only the identity-preserving diff: given the current
//! record set it decides which markers to create, move, refresh or remove,
//! and leaves drawing to the rendering layer. Markers whose record did not
//! change are never touched, so re-entering the map view does not rebuild
//! the layer.
//!
//! # Example
//!
//! ```
//! use client_sync::{MarkerIndex, Record};
//!
//! let records = vec![Record::new("c-1", "Laval").with_coordinates(45.57, -73.75)];
//! let mut index = MarkerIndex::new();
//!
//! let diff = index.reconcile(&records);
//! assert_eq!(diff.creates(), 1);
//!
//! // Same input, nothing to do
//! assert!(index.reconcile(&records).is_empty());
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::record::{Coordinates, Record, RecordId};
use crate::sector::SectorTag;

/// What a marker popup shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerContent {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub sector: SectorTag,
}

impl MarkerContent {
    fn of(record: &Record) -> Self {
        Self {
            name: record.display_name(),
            address: record.address.clone(),
            phone: record.phone.clone(),
            sector: record.resolved_sector(),
        }
    }
}

/// A rendered marker, identified by its record id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerHandle {
    pub id: RecordId,
    pub position: Coordinates,
    pub content: MarkerContent,
}

/// One mutation for the rendering layer to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Create { id: RecordId, position: Coordinates },
    Move { id: RecordId, from: Coordinates, to: Coordinates },
    /// Position unchanged, popup content changed.
    Refresh { id: RecordId },
    Remove { id: RecordId },
}

/// Result of [`MarkerIndex::reconcile`]: only the markers that change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerDiff {
    pub ops: Vec<MarkerOp>,
    /// Markers left untouched.
    pub unchanged: usize,
}

impl MarkerDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn creates(&self) -> usize {
        self.count(|op| matches!(op, MarkerOp::Create { .. }))
    }

    #[must_use]
    pub fn moves(&self) -> usize {
        self.count(|op| matches!(op, MarkerOp::Move { .. }))
    }

    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.count(|op| matches!(op, MarkerOp::Refresh { .. }))
    }

    #[must_use]
    pub fn removes(&self) -> usize {
        self.count(|op| matches!(op, MarkerOp::Remove { .. }))
    }

    fn count(&self, pred: impl Fn(&MarkerOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

/// Stable digest of the visible marker set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Marker bookkeeping numbers for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerStats {
    pub markers: usize,
    pub unmapped: usize,
}

/// Flat id → marker index.
#[derive(Debug, Default)]
pub struct MarkerIndex {
    markers: HashMap<RecordId, MarkerHandle>,
    /// Records known but without coordinates.
    unmapped: BTreeSet<RecordId>,
    rendered: Option<Fingerprint>,
}

impl MarkerIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&MarkerHandle> {
        self.markers.get(id)
    }

    pub fn markers(&self) -> impl Iterator<Item = &MarkerHandle> {
        self.markers.values()
    }

    #[must_use]
    pub fn unmapped(&self) -> &BTreeSet<RecordId> {
        &self.unmapped
    }

    #[must_use]
    pub fn stats(&self) -> MarkerStats {
        MarkerStats {
            markers: self.markers.len(),
            unmapped: self.unmapped.len(),
        }
    }

    /// Drop every marker and forget the rendered fingerprint.
    pub fn clear(&mut self) {
        self.markers.clear();
        self.unmapped.clear();
        self.rendered = None;
    }

    /// Bring the markers in line with `records`.
    ///
    /// Records with coordinates get exactly one marker; records without
    /// are tracked as unmapped; markers for ids absent from `records` are
    /// removed.
    pub fn reconcile<'a, I>(&mut self, records: I) -> MarkerDiff
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut diff = MarkerDiff::default();
        let mut seen: HashSet<&str> = HashSet::new();
        self.unmapped.clear();

        for record in records {
            seen.insert(record.id.as_str());

            let Some(position) = record.coordinates() else {
                self.unmapped.insert(record.id.clone());
                if self.markers.remove(&record.id).is_some() {
                    diff.ops.push(MarkerOp::Remove { id: record.id.clone() });
                }
                continue;
            };

            let content = MarkerContent::of(record);
            match self.markers.get_mut(&record.id) {
                Some(handle) => {
                    if handle.position != position {
                        diff.ops.push(MarkerOp::Move {
                            id: record.id.clone(),
                            from: handle.position,
                            to: position,
                        });
                        handle.position = position;
                        handle.content = content;
                    } else if handle.content != content {
                        diff.ops.push(MarkerOp::Refresh { id: record.id.clone() });
                        handle.content = content;
                    } else {
                        diff.unchanged += 1;
                    }
                }
                None => {
                    diff.ops.push(MarkerOp::Create { id: record.id.clone(), position });
                    self.markers.insert(
                        record.id.clone(),
                        MarkerHandle { id: record.id.clone(), position, content },
                    );
                }
            }
        }

        let stale: Vec<RecordId> = self
            .markers
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            self.markers.remove(&id);
            diff.ops.push(MarkerOp::Remove { id });
        }

        diff
    }

    /// Digest over (id, lat, lng, name, address) of the mapped records,
    /// independent of input order.
    #[must_use]
    pub fn fingerprint<'a, I>(records: I) -> Fingerprint
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut visible: Vec<(&Record, Coordinates)> = records
            .into_iter()
            .filter_map(|r| r.coordinates().map(|c| (r, c)))
            .collect();
        visible.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        let mut hasher = Sha256::new();
        for (record, position) in visible {
            hasher.update(record.id.as_bytes());
            hasher.update(b"|");
            hasher.update(position.lat.to_le_bytes());
            hasher.update(position.lng.to_le_bytes());
            hasher.update(b"|");
            hasher.update(record.display_name().as_bytes());
            hasher.update(b"|");
            hasher.update(record.address.as_bytes());
            hasher.update(b";");
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Whether the renderer must rebuild for `fingerprint`.
    #[must_use]
    pub fn needs_rebuild(&self, fingerprint: &Fingerprint) -> bool {
        self.rendered.as_ref() != Some(fingerprint)
    }

    /// Record that `fingerprint` is what is now on screen.
    pub fn mark_rendered(&mut self, fingerprint: Fingerprint) {
        self.rendered = Some(fingerprint);
    }

    #[must_use]
    pub fn rendered(&self) -> Option<&Fingerprint> {
        self.rendered.as_ref()
    }
}
