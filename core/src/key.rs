//! Key normalizer — turns a raw branch record into a deterministic identity.
//!
//! Two tiers:
//!   1. Coordinate key: (institution, lat, lon) rounded to `precision`
//!      decimal places. Four places is roughly 11 m, enough to absorb
//!      geocoding jitter while keeping real neighbours apart.
//!   2. Address key: (institution, address, city, state, zip), normalized.
//!      Used when coordinates are missing on either side of a comparison.
//!
//! RULE: derivation is a pure function of one record. It never looks at
//! other records in the snapshot.

use crate::{
    error::{NetResult, NetworkError},
    record::BranchRecord,
    types::InstitutionId,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COORDINATE_PRECISION: u32 = 4;

/// Past nine places the scaled value stops meaning anything for f64 input.
const MAX_COORDINATE_PRECISION: u32 = 9;

/// Derived identity of a physical branch location.
///
/// Ordering is total and stable so snapshots keyed by it iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum BranchKey {
    Coordinate {
        institution_id: InstitutionId,
        /// Latitude scaled by 10^precision and rounded.
        lat_scaled:     i64,
        /// Longitude scaled by 10^precision and rounded.
        lon_scaled:     i64,
        precision:      u32,
    },
    Address {
        institution_id: InstitutionId,
        address:        String,
        city:           String,
        state:          String,
        zip:            Option<String>,
    },
}

impl BranchKey {
    pub fn institution_id(&self) -> &str {
        match self {
            Self::Coordinate { institution_id, .. } | Self::Address { institution_id, .. } => {
                institution_id
            }
        }
    }

    pub fn is_coordinate(&self) -> bool {
        matches!(self, Self::Coordinate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNormalizer {
    precision: u32,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COORDINATE_PRECISION)
    }
}

impl KeyNormalizer {
    pub fn new(precision: u32) -> Self {
        Self {
            precision: precision.min(MAX_COORDINATE_PRECISION),
        }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Derive the primary key for a record: coordinates first, then address.
    pub fn derive_key(&self, record: &BranchRecord) -> NetResult<BranchKey> {
        if let Some(key) = self.coordinate_key(record) {
            return Ok(key);
        }
        if let Some(key) = address_key(record) {
            return Ok(key);
        }
        Err(NetworkError::UnlocatableBranch {
            year:   record.year,
            branch: record.label(),
        })
    }

    pub fn coordinate_key(&self, record: &BranchRecord) -> Option<BranchKey> {
        let (lat, lon) = usable_coordinates(record)?;
        let scale = 10f64.powi(self.precision as i32);
        Some(BranchKey::Coordinate {
            institution_id: record.institution_id.clone(),
            lat_scaled:     (lat * scale).round() as i64,
            lon_scaled:     (lon * scale).round() as i64,
            precision:      self.precision,
        })
    }
}

/// Derive a key with the default precision.
pub fn derive_key(record: &BranchRecord) -> NetResult<BranchKey> {
    KeyNormalizer::default().derive_key(record)
}

/// The address-tier key, independent of whether coordinates exist.
/// None when address, city or state is empty after normalization.
pub fn address_key(record: &BranchRecord) -> Option<BranchKey> {
    let address = normalize_text(record.address.as_deref()?);
    let city = normalize_text(record.city.as_deref()?);
    let state = normalize_state(record.state.as_deref()?);
    if address.is_empty() || city.is_empty() || state.is_empty() {
        return None;
    }
    Some(BranchKey::Address {
        institution_id: record.institution_id.clone(),
        address,
        city,
        state,
        zip: record.zip.as_deref().and_then(normalize_zip),
    })
}

/// True when the record carries coordinates the coordinate tier accepts.
pub fn has_usable_coordinates(record: &BranchRecord) -> bool {
    usable_coordinates(record).is_some()
}

fn usable_coordinates(record: &BranchRecord) -> Option<(f64, f64)> {
    let lat = record.latitude?;
    let lon = record.longitude?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    if lat.abs() > 90.0 || lon.abs() > 180.0 {
        return None;
    }
    // Null-island placeholder written by some upstream geocoders.
    if lat == 0.0 && lon == 0.0 {
        return None;
    }
    Some((lat, lon))
}

// ── Text normalization ─────────────────────────────────────────────

/// Lowercase, drop apostrophes and periods, treat any other punctuation
/// as a separator, collapse whitespace and abbreviate street suffixes.
pub fn normalize_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\'' | '.' | '\u{2019}') {
            continue;
        }
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .map(abbreviate)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_state(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// First five digits, left-padded when a numeric column dropped the
/// leading zero.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .split('-')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    match digits.len() {
        0 => None,
        1..=4 => Some(format!("{digits:0>5}")),
        _ => Some(digits[..5].to_string()),
    }
}

/// USPS-style abbreviations for suffixes, unit designators and directions.
fn abbreviate(token: &str) -> &str {
    match token {
        "street" | "str" | "strt" => "st",
        "avenue" | "av" | "aven" | "avn" => "ave",
        "road" => "rd",
        "boulevard" | "boul" | "blv" => "blvd",
        "drive" | "drv" => "dr",
        "lane" => "ln",
        "court" => "ct",
        "place" => "pl",
        "parkway" | "pkway" | "pky" => "pkwy",
        "highway" | "hiway" | "hway" => "hwy",
        "circle" => "cir",
        "terrace" => "ter",
        "square" => "sq",
        "trail" => "trl",
        "center" | "centre" => "ctr",
        "plaza" => "plz",
        "expressway" => "expy",
        "freeway" => "fwy",
        "turnpike" => "tpke",
        "route" => "rte",
        "suite" => "ste",
        "building" => "bldg",
        "floor" => "fl",
        "north" => "n",
        "south" => "s",
        "east" => "e",
        "west" => "w",
        "northeast" => "ne",
        "northwest" => "nw",
        "southeast" => "se",
        "southwest" => "sw",
        other => other,
    }
}
