// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sector → city → district index.
//!
//! ```text
//! Montréal ─┬─ districts ── "Plateau" ── [ids]
//!           └─ unassigned ── [ids]
//! Rive Sud ─── cities ─┬─ "Brossard" ─┬─ districts ── "Secteur L" ── [ids]
//!                      │              └─ direct ── [ids]
//!                      └─ "Longueuil" ── ...
//! ```
//!
//! Sectors that index by district (see [`SectorTag::indexes_by_district`])
//! have no city level. Every id lives in exactly one leaf; the
//! [`IndexPath`] of a record is a pure function of its fields, so moving a
//! record is always remove-then-insert. A secondary id → path map makes
//! removal O(leaf) instead of a scan over every bucket.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::record::{Record, RecordId};
use crate::sector::SectorTag;

/// A terminal bucket of record ids, in insertion order.
pub type Leaf = Vec<RecordId>;

/// Location of a record in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexPath {
    /// District bucket directly under a district-indexed sector.
    SectorDistrict { sector: SectorTag, district: String },
    /// Records of a district-indexed sector with no resolved district.
    SectorUnassigned { sector: SectorTag },
    /// District bucket within a city.
    CityDistrict { sector: SectorTag, city: String, district: String },
    /// Records of a city with no resolved district.
    City { sector: SectorTag, city: String },
}

impl IndexPath {
    /// Path a record belongs at, or `None` if it has no usable city.
    #[must_use]
    pub fn for_record(record: &Record) -> Option<Self> {
        let city = record.index_city()?;
        let sector = record.resolved_sector();
        let district = record.index_district().map(str::to_string);

        Some(match (sector.indexes_by_district(), district) {
            (true, Some(district)) => Self::SectorDistrict { sector, district },
            (true, None) => Self::SectorUnassigned { sector },
            (false, Some(district)) => Self::CityDistrict {
                sector,
                city: city.to_string(),
                district,
            },
            (false, None) => Self::City { sector, city: city.to_string() },
        })
    }

    #[must_use]
    pub fn sector(&self) -> SectorTag {
        match self {
            Self::SectorDistrict { sector, .. }
            | Self::SectorUnassigned { sector }
            | Self::CityDistrict { sector, .. }
            | Self::City { sector, .. } => *sector,
        }
    }
}

/// A city under a city-indexed sector.
#[derive(Debug, Clone, Default)]
pub struct CityNode {
    pub districts: BTreeMap<String, Leaf>,
    /// Records without a resolved district.
    pub direct: Leaf,
    count: usize,
}

impl CityNode {
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    fn recount(&mut self) {
        self.count = self.direct.len() + self.districts.values().map(Vec::len).sum::<usize>();
    }

    fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.districts.is_empty()
    }
}

/// Root node for one sector.
#[derive(Debug, Clone, Default)]
pub struct SectorNode {
    /// Used by district-indexed sectors only.
    pub districts: BTreeMap<String, Leaf>,
    /// Used by district-indexed sectors only.
    pub unassigned: Leaf,
    /// Used by city-indexed sectors only.
    pub cities: BTreeMap<String, CityNode>,
    count: usize,
}

impl SectorNode {
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    fn recount(&mut self) {
        self.count = self.unassigned.len()
            + self.districts.values().map(Vec::len).sum::<usize>()
            + self.cities.values().map(CityNode::count).sum::<usize>();
    }

    fn is_empty(&self) -> bool {
        self.unassigned.is_empty() && self.districts.is_empty() && self.cities.is_empty()
    }
}

/// Kind of a display bucket inside a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    City,
    District,
    Unassigned,
}

/// One row of a sector's bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub kind: BucketKind,
    pub count: usize,
}

/// One row of the sector listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectorSummary {
    pub sector: SectorTag,
    pub count: usize,
}

/// Sector-less view: city → record ids.
///
/// Always derived from the tree by [`HierarchicalIndex::project`].
pub type CityProjection = BTreeMap<String, Vec<RecordId>>;

/// The sector → city → district tree.
#[derive(Debug, Clone, Default)]
pub struct HierarchicalIndex {
    sectors: BTreeMap<SectorTag, SectorNode>,
    locations: HashMap<RecordId, IndexPath>,
}

impl HierarchicalIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn clear(&mut self) {
        self.sectors.clear();
        self.locations.clear();
    }

    #[must_use]
    pub fn path_of(&self, id: &str) -> Option<&IndexPath> {
        self.locations.get(id)
    }

    #[must_use]
    pub fn sector(&self, sector: SectorTag) -> Option<&SectorNode> {
        self.sectors.get(&sector)
    }

    /// Ids in the leaf at `path` (empty if the leaf does not exist).
    #[must_use]
    pub fn leaf(&self, path: &IndexPath) -> &[RecordId] {
        let Some(node) = self.sectors.get(&path.sector()) else {
            return &[];
        };
        let leaf = match path {
            IndexPath::SectorDistrict { district, .. } => node.districts.get(district),
            IndexPath::SectorUnassigned { .. } => Some(&node.unassigned),
            IndexPath::CityDistrict { city, district, .. } => {
                node.cities.get(city).and_then(|c| c.districts.get(district))
            }
            IndexPath::City { city, .. } => node.cities.get(city).map(|c| &c.direct),
        };
        leaf.map(Vec::as_slice).unwrap_or_default()
    }

    /// Sum of all leaf lengths, computed by walking the tree.
    #[must_use]
    pub fn leaf_total(&self) -> usize {
        self.leaves().map(|(_, leaf)| leaf.len()).sum()
    }

    /// Every non-empty leaf with its path.
    pub fn leaves(&self) -> impl Iterator<Item = (IndexPath, &Leaf)> + '_ {
        self.sectors.iter().flat_map(|(&sector, node)| {
            let districts = node.districts.iter().map(move |(district, leaf)| {
                (IndexPath::SectorDistrict { sector, district: district.clone() }, leaf)
            });
            let unassigned = std::iter::once((IndexPath::SectorUnassigned { sector }, &node.unassigned))
                .filter(|(_, leaf)| !leaf.is_empty());
            let cities = node.cities.iter().flat_map(move |(city, city_node)| {
                let districts = city_node.districts.iter().map(move |(district, leaf)| {
                    (
                        IndexPath::CityDistrict {
                            sector,
                            city: city.clone(),
                            district: district.clone(),
                        },
                        leaf,
                    )
                });
                let direct = std::iter::once((IndexPath::City { sector, city: city.clone() }, &city_node.direct))
                    .filter(|(_, leaf)| !leaf.is_empty());
                districts.chain(direct)
            });
            districts.chain(unassigned).chain(cities)
        })
    }

    /// Insert `id` at `path`, moving it if it is already indexed elsewhere.
    ///
    /// Returns the previous path when the id moved.
    pub fn insert(&mut self, id: RecordId, path: IndexPath) -> Option<IndexPath> {
        if self.locations.get(&id) == Some(&path) {
            return None;
        }
        let previous = self.remove(&id);
        self.leaf_mut(&path).push(id.clone());
        self.recount(&path);
        self.locations.insert(id, path);
        previous
    }

    /// Remove `id` from its leaf, dropping nodes left empty.
    pub fn remove(&mut self, id: &str) -> Option<IndexPath> {
        let path = self.locations.remove(id)?;
        let sector = path.sector();

        if let Some(node) = self.sectors.get_mut(&sector) {
            match &path {
                IndexPath::SectorDistrict { district, .. } => {
                    if let Some(leaf) = node.districts.get_mut(district) {
                        leaf.retain(|other| other != id);
                        if leaf.is_empty() {
                            node.districts.remove(district);
                        }
                    }
                }
                IndexPath::SectorUnassigned { .. } => node.unassigned.retain(|other| other != id),
                IndexPath::CityDistrict { city, district, .. } => {
                    if let Some(city_node) = node.cities.get_mut(city) {
                        if let Some(leaf) = city_node.districts.get_mut(district) {
                            leaf.retain(|other| other != id);
                            if leaf.is_empty() {
                                city_node.districts.remove(district);
                            }
                        }
                    }
                }
                IndexPath::City { city, .. } => {
                    if let Some(city_node) = node.cities.get_mut(city) {
                        city_node.direct.retain(|other| other != id);
                    }
                }
            }
        }

        self.recount(&path);
        Some(path)
    }

    fn leaf_mut(&mut self, path: &IndexPath) -> &mut Leaf {
        let node = self.sectors.entry(path.sector()).or_default();
        match path {
            IndexPath::SectorDistrict { district, .. } => {
                node.districts.entry(district.clone()).or_default()
            }
            IndexPath::SectorUnassigned { .. } => &mut node.unassigned,
            IndexPath::CityDistrict { city, district, .. } => node
                .cities
                .entry(city.clone())
                .or_default()
                .districts
                .entry(district.clone())
                .or_default(),
            IndexPath::City { city, .. } => &mut node.cities.entry(city.clone()).or_default().direct,
        }
    }

    /// Recompute counts along `path`, pruning nodes that became empty.
    fn recount(&mut self, path: &IndexPath) {
        let sector = path.sector();
        let Some(node) = self.sectors.get_mut(&sector) else {
            return;
        };

        if let IndexPath::CityDistrict { city, .. } | IndexPath::City { city, .. } = path {
            if let Some(city_node) = node.cities.get_mut(city) {
                city_node.recount();
                if city_node.is_empty() {
                    node.cities.remove(city);
                }
            }
        }

        node.recount();
        if node.is_empty() {
            self.sectors.remove(&sector);
        }
    }

    /// Flattened city → ids projection.
    ///
    /// District-indexed sectors project under their display name, since
    /// their cities are a single metropolitan entity.
    #[must_use]
    pub fn project(&self) -> CityProjection {
        let mut projection = CityProjection::new();
        for (sector, node) in &self.sectors {
            if sector.indexes_by_district() {
                let ids = projection.entry(sector.as_str().to_string()).or_default();
                ids.extend(node.districts.values().flatten().cloned());
                ids.extend(node.unassigned.iter().cloned());
            }
            for (city, city_node) in &node.cities {
                let ids = projection.entry(city.clone()).or_default();
                ids.extend(city_node.districts.values().flatten().cloned());
                ids.extend(city_node.direct.iter().cloned());
            }
        }
        projection
    }

    /// Sectors ordered by descending count, with the catch-all sector last.
    #[must_use]
    pub fn sorted_sectors(&self) -> Vec<SectorSummary> {
        let mut sectors: Vec<SectorSummary> = self
            .sectors
            .iter()
            .map(|(&sector, node)| SectorSummary { sector, count: node.count() })
            .collect();
        sectors.sort_by(|a, b| {
            a.sector
                .is_catch_all()
                .cmp(&b.sector.is_catch_all())
                .then(b.count.cmp(&a.count))
                .then(a.sector.cmp(&b.sector))
        });
        sectors
    }

    /// Buckets of one sector ordered by descending count, ties by name.
    /// The unassigned bucket always comes last.
    #[must_use]
    pub fn sorted_buckets(&self, sector: SectorTag) -> Vec<BucketSummary> {
        let Some(node) = self.sectors.get(&sector) else {
            return Vec::new();
        };

        let mut buckets: Vec<BucketSummary> = node
            .districts
            .iter()
            .map(|(name, leaf)| BucketSummary {
                name: name.clone(),
                kind: BucketKind::District,
                count: leaf.len(),
            })
            .chain(node.cities.iter().map(|(name, city)| BucketSummary {
                name: name.clone(),
                kind: BucketKind::City,
                count: city.count(),
            }))
            .collect();
        if !node.unassigned.is_empty() {
            buckets.push(BucketSummary {
                name: String::new(),
                kind: BucketKind::Unassigned,
                count: node.unassigned.len(),
            });
        }

        buckets.sort_by(|a, b| {
            (a.kind == BucketKind::Unassigned)
                .cmp(&(b.kind == BucketKind::Unassigned))
                .then(b.count.cmp(&a.count))
                .then_with(|| a.name.cmp(&b.name))
        });
        buckets
    }
}
