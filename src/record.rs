// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client record data structure.
//!
//! A [`Record`] is the unit of data tracked by the engine: one
//! address-bearing client, keyed by an opaque server id. The client never
//! edits a record field by field; it receives whole-record upserts from the
//! server, or replaces the whole record after an address correction.
//!
//! # Example
//!
//! ```
//! use client_sync::{Record, SectorTag};
//!
//! let record = Record::new("c-1", "Brossard").with_district("Secteur L");
//! assert_eq!(record.resolved_sector(), SectorTag::RiveSud);
//! assert!(record.coordinates().is_none());
//! ```

use serde::{Deserialize, Serialize};

use crate::sector::{classify, SectorTag};

/// Opaque, stable record identifier.
pub type RecordId = String;

/// Geocoded position of a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Resolved location returned by the server after an address correction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

/// A single client entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(alias = "_id")]
    pub id: RecordId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Server-computed sector tag. Authoritative when it parses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default)]
    pub frequent: bool,
}

impl Record {
    /// Create a record with only the fields the index needs.
    pub fn new(id: impl Into<RecordId>, city: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: String::new(),
            last_name: String::new(),
            company_name: None,
            phone: None,
            address: String::new(),
            lat: None,
            lng: None,
            city: city.into(),
            district: None,
            sector: None,
            frequent: false,
        }
    }

    #[must_use]
    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    #[must_use]
    pub fn with_sector(mut self, sector: SectorTag) -> Self {
        self.sector = Some(sector.as_str().to_string());
        self
    }

    #[must_use]
    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sector used for indexing: the server tag if it is a known sector,
    /// otherwise the local classifier applied to the city.
    #[must_use]
    pub fn resolved_sector(&self) -> SectorTag {
        self.sector
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| classify(&self.city))
    }

    /// Trimmed city name, or `None` when the record cannot be indexed.
    #[must_use]
    pub fn index_city(&self) -> Option<&str> {
        let city = self.city.trim();
        (!city.is_empty()).then_some(city)
    }

    /// Trimmed district name, if resolved.
    #[must_use]
    pub fn index_district(&self) -> Option<&str> {
        self.district
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Coordinates, when both components are present and finite.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(Coordinates { lat, lng })
            }
            _ => None,
        }
    }

    /// Name shown on list rows and marker popups.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(company) = self.company_name.as_deref().filter(|c| !c.trim().is_empty()) {
            return company.trim().to_string();
        }
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Overlay a server-resolved location onto this record.
    ///
    /// The district always follows the location, so a record whose city
    /// changed does not keep the old city's district.
    #[must_use]
    pub fn relocated(mut self, location: &Location) -> Self {
        if let Some(sector) = &location.sector {
            self.sector = Some(sector.clone());
        }
        if let Some(city) = &location.city {
            self.city = city.clone();
        }
        self.district = location.district.clone();
        self
    }
}
