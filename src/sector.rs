// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sector classification.
//!
//! A sector is the coarse geographic grouping at the root of the
//! hierarchical index. The server computes the authoritative tag; the
//! [`classify`] function here is the local fallback used when a record
//! arrives without one, and must resolve every city the same way.
//!
//! # Example
//!
//! ```
//! use client_sync::sector::{classify, SectorTag};
//!
//! assert_eq!(classify("MONTRÉAL "), SectorTag::Montreal);
//! assert_eq!(classify("Brossard"), SectorTag::RiveSud);
//! assert_eq!(classify("Nowhereville"), SectorTag::Autres);
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Cities of the north shore, matched by substring in this order.
pub const RIVE_NORD_CITIES: &[&str] = &[
    "terrebonne",
    "repentigny",
    "mascouche",
    "lachenaie",
    "blainville",
    "boisbriand",
    "sainte-thérèse",
    "sainte-therese",
    "rosemère",
    "rosemere",
    "lorraine",
    "bois-des-filion",
    "saint-eustache",
    "deux-montagnes",
    "sainte-marthe-sur-le-lac",
    "pointe-calumet",
    "mirabel",
    "saint-jérôme",
    "saint-jerome",
    "charlemagne",
    "l'assomption",
    "l'épiphanie",
    "saint-colomban",
    "sainte-anne-des-plaines",
];

/// Cities of the south shore, matched by substring in this order.
pub const RIVE_SUD_CITIES: &[&str] = &[
    "longueuil",
    "brossard",
    "saint-lambert",
    "greenfield park",
    "saint-hubert",
    "boucherville",
    "saint-bruno",
    "varennes",
    "sainte-julie",
    "la prairie",
    "laprairie",
    "candiac",
    "delson",
    "saint-constant",
    "sainte-catherine",
    "châteauguay",
    "chateauguay",
    "mercier",
    "beauharnois",
    "chambly",
    "carignan",
    "beloeil",
    "mont-saint-hilaire",
    "saint-jean-sur-richelieu",
    "lemoyne",
];

/// Coarse geographic grouping of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectorTag {
    #[serde(rename = "Montréal", alias = "Montreal")]
    Montreal,
    #[serde(rename = "Laval")]
    Laval,
    #[serde(rename = "Rive Nord")]
    RiveNord,
    #[serde(rename = "Rive Sud")]
    RiveSud,
    #[serde(rename = "Autres")]
    Autres,
}

impl SectorTag {
    pub const ALL: [SectorTag; 5] = [
        SectorTag::Montreal,
        SectorTag::Laval,
        SectorTag::RiveNord,
        SectorTag::RiveSud,
        SectorTag::Autres,
    ];

    /// Display name, identical to the server's tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Montreal => "Montréal",
            Self::Laval => "Laval",
            Self::RiveNord => "Rive Nord",
            Self::RiveSud => "Rive Sud",
            Self::Autres => "Autres",
        }
    }

    /// Sectors whose cities are single metropolitan entities are indexed by
    /// district directly, with no city level.
    #[must_use]
    pub fn indexes_by_district(&self) -> bool {
        matches!(self, Self::Montreal | Self::Laval)
    }

    /// The catch-all sector, always sorted last for display.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::Autres)
    }
}

impl std::fmt::Display for SectorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sector tag: {0}")]
pub struct UnknownSector(pub String);

impl FromStr for SectorTag {
    type Err = UnknownSector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "montréal" | "montreal" => Ok(Self::Montreal),
            "laval" => Ok(Self::Laval),
            "rive nord" | "rive-nord" => Ok(Self::RiveNord),
            "rive sud" | "rive-sud" => Ok(Self::RiveSud),
            "autres" => Ok(Self::Autres),
            _ => Err(UnknownSector(s.to_string())),
        }
    }
}

/// Classify a city name into its sector.
///
/// First match wins: exact Montréal, exact Laval, Rive Nord substring,
/// Rive Sud substring, then [`SectorTag::Autres`].
#[must_use]
pub fn classify(city: &str) -> SectorTag {
    let city = city.trim().to_lowercase();

    if city == "montréal" || city == "montreal" {
        return SectorTag::Montreal;
    }
    if city == "laval" {
        return SectorTag::Laval;
    }
    if RIVE_NORD_CITIES.iter().any(|c| city.contains(c)) {
        return SectorTag::RiveNord;
    }
    if RIVE_SUD_CITIES.iter().any(|c| city.contains(c)) {
        return SectorTag::RiveSud;
    }
    SectorTag::Autres
}
