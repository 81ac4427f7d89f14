//! Synthetic branch networks — seeded, multi-year, with known churn.
//!
//! Used by integration tests and the runner's demo mode. The generator
//! tracks which sites opened and closed each year, so a diff over its
//! snapshots can be checked against ground truth.
//!
//! Sites have unique street addresses by construction. A site keeps its
//! coordinates and window count for life; per-year noise only decides
//! whether that year's records drop their coordinates.

use crate::{
    error::{NetResult, NetworkError},
    loader::SnapshotLoader,
    record::BranchRecord,
    rng::{FixtureRng, Stream},
    types::{InstitutionId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

struct Market {
    city:   &'static str,
    state:  &'static str,
    county: &'static str,
    metro:  &'static str,
    lat:    f64,
    lon:    f64,
}

const MARKETS: &[Market] = &[
    Market { city: "Columbus",     state: "OH", county: "Franklin",     metro: "Columbus, OH",                           lat: 39.96, lon: -83.00 },
    Market { city: "Cleveland",    state: "OH", county: "Cuyahoga",     metro: "Cleveland-Elyria, OH",                   lat: 41.50, lon: -81.69 },
    Market { city: "Detroit",      state: "MI", county: "Wayne",        metro: "Detroit-Warren-Dearborn, MI",            lat: 42.33, lon: -83.05 },
    Market { city: "Chicago",      state: "IL", county: "Cook",         metro: "Chicago-Naperville-Elgin, IL-IN-WI",     lat: 41.88, lon: -87.63 },
    Market { city: "Indianapolis", state: "IN", county: "Marion",       metro: "Indianapolis-Carmel-Anderson, IN",       lat: 39.77, lon: -86.16 },
    Market { city: "Houston",      state: "TX", county: "Harris",       metro: "Houston-The Woodlands-Sugar Land, TX",   lat: 29.76, lon: -95.37 },
    Market { city: "Dallas",       state: "TX", county: "Dallas",       metro: "Dallas-Fort Worth-Arlington, TX",        lat: 32.78, lon: -96.80 },
    Market { city: "Atlanta",      state: "GA", county: "Fulton",       metro: "Atlanta-Sandy Springs-Alpharetta, GA",   lat: 33.75, lon: -84.39 },
    Market { city: "Tampa",        state: "FL", county: "Hillsborough", metro: "Tampa-St Petersburg-Clearwater, FL",     lat: 27.95, lon: -82.46 },
    Market { city: "Charlotte",    state: "NC", county: "Mecklenburg",  metro: "Charlotte-Concord-Gastonia, NC-SC",      lat: 35.23, lon: -80.84 },
    Market { city: "Phoenix",      state: "AZ", county: "Maricopa",     metro: "Phoenix-Mesa-Chandler, AZ",              lat: 33.45, lon: -112.07 },
    Market { city: "Pittsburgh",   state: "PA", county: "Allegheny",    metro: "Pittsburgh, PA",                         lat: 40.44, lon: -79.99 },
];

const STREETS: &[&str] = &[
    "Main Street", "Market Street", "Oak Avenue", "Maple Drive", "Washington Boulevard",
    "Lincoln Road", "Park Place", "Lake Shore Drive", "Commerce Parkway", "Church Lane",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub institution_id:          InstitutionId,
    pub first_year:              Year,
    pub year_count:              u32,
    pub initial_sites:           usize,
    /// Per-year probability that a live site closes.
    pub close_rate:              f64,
    /// New sites per year, as a fraction of `initial_sites`.
    pub open_rate:               f64,
    /// Probability a site hosts two co-located service windows.
    pub colocated_rate:          f64,
    /// Per site-year probability that records omit coordinates.
    pub missing_coordinate_rate: f64,
    /// Extra unlocatable records per year, as a fraction of live sites.
    pub unlocatable_rate:        f64,
    /// Years generated but withheld from the loader.
    #[serde(default)]
    pub withheld_years:          Vec<Year>,
}

impl SyntheticConfig {
    pub fn new(institution_id: &str, first_year: Year, year_count: u32) -> Self {
        Self {
            institution_id:          institution_id.to_string(),
            first_year,
            year_count,
            initial_sites:           200,
            close_rate:              0.04,
            open_rate:               0.03,
            colocated_rate:          0.10,
            missing_coordinate_rate: 0.0,
            unlocatable_rate:        0.0,
            withheld_years:          Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Site {
    index:   usize,
    market:  usize,
    lat:     f64,
    lon:     f64,
    address: String,
    windows: usize,
}

/// Ground-truth churn between a year and the one before it, in record
/// instances (a two-window site counts twice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrueChurn {
    pub opened: usize,
    pub closed: usize,
}

pub struct SyntheticNetwork {
    config:    SyntheticConfig,
    snapshots: BTreeMap<Year, Vec<BranchRecord>>,
    churn:     BTreeMap<Year, TrueChurn>,
}

impl SyntheticNetwork {
    pub fn generate(config: SyntheticConfig, seed: u64) -> Self {
        let mut site_rng = FixtureRng::new(seed, Stream::Sites);
        let mut churn_rng = FixtureRng::new(seed, Stream::Churn);
        let mut noise_rng = FixtureRng::new(seed, Stream::RecordNoise);

        let mut next_index = 0usize;
        let mut live: Vec<Site> = (0..config.initial_sites)
            .map(|_| new_site(&mut site_rng, &mut next_index, config.colocated_rate))
            .collect();

        let mut snapshots = BTreeMap::new();
        let mut churn = BTreeMap::new();
        let new_per_year = (config.initial_sites as f64 * config.open_rate).round() as usize;

        for offset in 0..config.year_count {
            let year = config.first_year + offset as Year;

            if offset > 0 {
                let before = live.len();
                let mut closed = 0;
                live.retain(|site| {
                    let keep = !churn_rng.chance(config.close_rate);
                    if !keep {
                        closed += site.windows;
                    }
                    keep
                });
                let mut opened = 0;
                for _ in 0..new_per_year {
                    let site = new_site(&mut site_rng, &mut next_index, config.colocated_rate);
                    opened += site.windows;
                    live.push(site);
                }
                log::debug!(
                    "synthetic {year}: {before} sites -> {} ({opened} opened, {closed} closed instances)",
                    live.len()
                );
                churn.insert(year, TrueChurn { opened, closed });
            }

            let records = emit_records(&config, year, &live, &mut noise_rng);
            snapshots.insert(year, records);
        }

        Self { config, snapshots, churn }
    }

    pub fn institution_id(&self) -> &str {
        &self.config.institution_id
    }

    pub fn years(&self) -> Vec<Year> {
        self.snapshots.keys().copied().collect()
    }

    pub fn records(&self, year: Year) -> Option<&[BranchRecord]> {
        self.snapshots.get(&year).map(Vec::as_slice)
    }

    /// Churn from `year - 1` to `year`.
    pub fn true_churn(&self, year: Year) -> Option<TrueChurn> {
        self.churn.get(&year).copied()
    }
}

impl SnapshotLoader for SyntheticNetwork {
    fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>> {
        if institution_id != self.config.institution_id {
            return Err(NetworkError::InstitutionNotFound {
                institution_id: institution_id.to_string(),
            });
        }
        if self.config.withheld_years.contains(&year) {
            return Ok(None);
        }
        Ok(self.snapshots.get(&year).cloned())
    }
}

fn new_site(rng: &mut FixtureRng, next_index: &mut usize, colocated_rate: f64) -> Site {
    let index = *next_index;
    *next_index += 1;
    let market = rng.next_u64_below(MARKETS.len() as u64) as usize;
    let m = &MARKETS[market];
    let street = rng.pick(STREETS);
    Site {
        index,
        market,
        lat: m.lat + rng.between(-0.25, 0.25),
        lon: m.lon + rng.between(-0.25, 0.25),
        // Unique house number per site keeps addresses distinct.
        address: format!("{} {street}", 100 + index * 7),
        windows: if rng.chance(colocated_rate) { 2 } else { 1 },
    }
}

fn emit_records(
    config: &SyntheticConfig,
    year: Year,
    live: &[Site],
    rng: &mut FixtureRng,
) -> Vec<BranchRecord> {
    let mut records = Vec::with_capacity(live.len() + 8);
    for site in live {
        let m = &MARKETS[site.market];
        let drop_coordinates = rng.chance(config.missing_coordinate_rate);
        for window in 0..site.windows {
            let mut record = BranchRecord::new(config.institution_id.clone(), year)
                .with_address(&site.address, m.city, m.state, &format!("{:05}", 10_000 + site.market * 1_111))
                .with_county(m.county)
                .with_metro_area(m.metro)
                .with_name(&format!("{} Branch {}", m.city, site.index))
                .with_branch_id(&format!("S{}-{window}", site.index))
                .with_service_type(if window == 0 { "full_service" } else { "drive_through" });
            if !drop_coordinates {
                record = record.with_coordinates(site.lat, site.lon);
            }
            record.deposit_amount = Some(10_000_000.0 + rng.between(0.0, 90_000_000.0).round());
            records.push(record);
        }
    }

    let unlocatable = (live.len() as f64 * config.unlocatable_rate).round() as usize;
    for i in 0..unlocatable {
        records.push(
            BranchRecord::new(config.institution_id.clone(), year)
                .with_name(&format!("Mobile Unit {i}"))
                .with_service_type("mobile"),
        );
    }
    records
}
