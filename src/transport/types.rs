// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire shapes of the server boundary (the subset the engine consumes).

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::record::{Location, Record, RecordId};
use crate::sector::SectorTag;
use crate::watermark::Watermark;

/// Full by-city listing, keyed by sector display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HierarchicalSnapshot(pub BTreeMap<String, SectorSnapshot>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorSnapshot {
    #[serde(default)]
    pub districts: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    pub unassigned: Vec<Record>,
    #[serde(default)]
    pub cities: BTreeMap<String, CitySnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitySnapshot {
    #[serde(default)]
    pub districts: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    pub clients: Vec<Record>,
}

impl HierarchicalSnapshot {
    /// Number of records in the listing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0
            .values()
            .map(|s| {
                s.unassigned.len()
                    + s.districts.values().map(Vec::len).sum::<usize>()
                    + s.cities
                        .values()
                        .map(|c| c.clients.len() + c.districts.values().map(Vec::len).sum::<usize>())
                        .sum::<usize>()
            })
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every record in the listing.
    #[must_use]
    pub fn record_ids(&self) -> HashSet<RecordId> {
        self.clone().into_records().into_iter().map(|r| r.id).collect()
    }

    /// Flatten into records, filling fields the payload left out from the
    /// position each record was listed at.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.len());

        for (sector_name, sector) in self.0 {
            let parsed: Option<SectorTag> = sector_name.parse().ok();
            let fill = |mut record: Record, city: &str, district: Option<&str>| {
                if record.sector.is_none() && parsed.is_some() {
                    record.sector = Some(sector_name.clone());
                }
                if record.index_city().is_none() {
                    record.city = city.to_string();
                }
                if record.index_district().is_none() {
                    record.district = district.map(str::to_string);
                }
                record
            };

            for (district, list) in sector.districts {
                records.extend(list.into_iter().map(|r| fill(r, &sector_name, Some(&district))));
            }
            records.extend(sector.unassigned.into_iter().map(|r| fill(r, &sector_name, None)));
            for (city, node) in sector.cities {
                for (district, list) in node.districts {
                    records.extend(list.into_iter().map(|r| fill(r, &city, Some(&district))));
                }
                records.extend(node.clients.into_iter().map(|r| fill(r, &city, None)));
            }
        }

        records
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByCityResponse {
    pub success: bool,
    #[serde(default)]
    pub data: HierarchicalSnapshot,
    #[serde(default)]
    pub total_clients: usize,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    pub success: bool,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub clients_for_by_city: Option<Vec<Record>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A client the server knows but could not place on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedClient {
    #[serde(alias = "_id")]
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForMapResponse {
    pub success: bool,
    #[serde(default)]
    pub clients: Vec<Record>,
    #[serde(default)]
    pub total_with_coordinates: usize,
    #[serde(default)]
    pub without_coordinates: usize,
    #[serde(default)]
    pub missing_clients: Vec<UnmappedClient>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdateResponse {
    pub success: bool,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest<'a> {
    pub client_id: &'a str,
    pub new_address: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientResponse {
    pub success: bool,
    #[serde(default)]
    pub client: Option<Record>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a delta query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub has_changes: bool,
    pub last_update: Option<Watermark>,
    /// Changed records with a usable address; `None` when the server sent none.
    pub upserts: Option<Vec<Record>>,
}

impl ChangeSet {
    /// Upserts, treating an empty list like an absent one.
    #[must_use]
    pub fn upserts(&self) -> Option<&[Record]> {
        self.upserts.as_deref().filter(|u| !u.is_empty())
    }
}

impl From<ChangesResponse> for ChangeSet {
    fn from(response: ChangesResponse) -> Self {
        Self {
            has_changes: response.has_changes,
            last_update: response.last_update.and_then(Watermark::from_server),
            upserts: response.clients_for_by_city,
        }
    }
}

/// Flat listing for the map view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapListing {
    pub clients: Vec<Record>,
    pub total_with_coordinates: usize,
    pub without_coordinates: usize,
    pub missing_clients: Vec<UnmappedClient>,
}

impl MapListing {
    /// Ids of every client the listing accounts for, mapped or not.
    #[must_use]
    pub fn record_ids(&self) -> HashSet<RecordId> {
        self.clients
            .iter()
            .map(|r| r.id.clone())
            .chain(self.missing_clients.iter().map(|m| m.id.clone()))
            .collect()
    }
}

impl From<ForMapResponse> for MapListing {
    fn from(response: ForMapResponse) -> Self {
        Self {
            clients: response.clients,
            total_with_coordinates: response.total_with_coordinates,
            without_coordinates: response.without_coordinates,
            missing_clients: response.missing_clients,
        }
    }
}

/// A corrected record and where the server placed it.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedClient {
    pub client: Record,
    pub location: Location,
}

impl CorrectedClient {
    /// The record with the server's resolved location applied.
    #[must_use]
    pub fn into_record(self) -> Record {
        self.client.relocated(&self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_fills_path_fields() {
        let snapshot: HierarchicalSnapshot = serde_json::from_value(json!({
            "Laval": {
                "districts": { "Chomedey": [{ "id": "a", "city": "Laval" }] },
                "unassigned": [{ "id": "b" }]
            },
            "Rive Sud": {
                "cities": {
                    "Brossard": {
                        "districts": { "Secteur L": [{ "id": "c" }] },
                        "clients": [{ "id": "d", "city": "Brossard" }]
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(snapshot.len(), 4);
        let mut records = snapshot.into_records();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(records[0].index_district(), Some("Chomedey"));
        assert_eq!(records[0].resolved_sector(), SectorTag::Laval);
        assert_eq!(records[1].city, "Laval");
        assert!(records[1].district.is_none());
        assert_eq!(records[2].city, "Brossard");
        assert_eq!(records[2].index_district(), Some("Secteur L"));
        assert_eq!(records[3].sector.as_deref(), Some("Rive Sud"));
    }

    #[test]
    fn test_record_fields_win_over_path() {
        let snapshot: HierarchicalSnapshot = serde_json::from_value(json!({
            "Laval": { "districts": { "Chomedey": [{ "id": "a", "city": "Laval", "district": "Vimont" }] } }
        }))
        .unwrap();
        let records = snapshot.into_records();
        assert_eq!(records[0].index_district(), Some("Vimont"));
    }

    #[test]
    fn test_changes_response_conversion() {
        let response: ChangesResponse = serde_json::from_value(json!({
            "success": true,
            "hasChanges": true,
            "lastUpdate": "2026-03-01T10:00:05Z"
        }))
        .unwrap();
        let changes = ChangeSet::from(response);
        assert!(changes.has_changes);
        assert_eq!(changes.last_update.as_ref().unwrap().as_str(), "2026-03-01T10:00:05Z");
        assert!(changes.upserts().is_none());
    }

    #[test]
    fn test_empty_upsert_list_counts_as_none() {
        let changes = ChangeSet { has_changes: true, last_update: None, upserts: Some(vec![]) };
        assert!(changes.upserts().is_none());
    }

    #[test]
    fn test_map_listing_ids_include_missing() {
        let response: ForMapResponse = serde_json::from_value(json!({
            "success": true,
            "clients": [{ "id": "a", "city": "Laval", "lat": 45.5, "lng": -73.7 }],
            "totalWithCoordinates": 1,
            "withoutCoordinates": 1,
            "missingClients": [{ "_id": "b", "name": "Sans adresse" }]
        }))
        .unwrap();
        let listing = MapListing::from(response);
        let ids = listing.record_ids();
        assert!(ids.contains("a") && ids.contains("b"));
    }

    #[test]
    fn test_update_request_shape() {
        let body = serde_json::to_value(UpdateClientRequest { client_id: "a", new_address: "1 rue X" }).unwrap();
        assert_eq!(body, json!({ "clientId": "a", "newAddress": "1 rue X" }));
    }
}
