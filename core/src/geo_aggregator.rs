//! Geographic aggregator — where did openings and closures concentrate?
//!
//! Groups Opened and Closed change records by state, metro area and city,
//! then ranks each grouping: count descending, ties broken by group key
//! ascending. Records missing a dimension value land in `Unknown` instead
//! of being dropped, so the group counts always sum to the population.

use crate::{
    config::AnalysisConfig,
    diff_engine::{ChangeKind, ChangeSet},
    key::normalize_state,
    record::BranchRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN_GROUP: &str = "Unknown";
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoDimension {
    State,
    MetroArea,
    City,
}

impl GeoDimension {
    pub const ALL: [GeoDimension; 3] = [Self::State, Self::MetroArea, Self::City];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Opened,
    Closed,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Self::Opened, Self::Closed];

    fn kind(self) -> ChangeKind {
        match self {
            Self::Opened => ChangeKind::Opened,
            Self::Closed => ChangeKind::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub group: String,
    pub count: usize,
}

/// Ranked top-N for one (direction, dimension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicAggregate {
    pub dimension:   GeoDimension,
    pub direction:   Direction,
    /// Instances in the population before truncation.
    pub total:       usize,
    /// Distinct groups before truncation.
    pub group_count: usize,
    pub top:         Vec<GroupCount>,
}

/// All six aggregates for one population, in fixed order:
/// opened × (state, metro, city), then closed × (state, metro, city).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeographicBreakdown {
    pub aggregates: Vec<GeographicAggregate>,
}

impl GeographicBreakdown {
    pub fn get(&self, direction: Direction, dimension: GeoDimension) -> Option<&GeographicAggregate> {
        self.aggregates
            .iter()
            .find(|a| a.direction == direction && a.dimension == dimension)
    }

    pub fn top_groups(&self, direction: Direction, dimension: GeoDimension) -> &[GroupCount] {
        self.get(direction, dimension).map_or(&[][..], |a| a.top.as_slice())
    }

    pub fn total(&self, direction: Direction) -> usize {
        self.get(direction, GeoDimension::State).map_or(0, |a| a.total)
    }
}

pub struct GeoAggregator {
    top_n:        usize,
    /// "ST|county" -> metro name, keys already normalized.
    metro_lookup: BTreeMap<String, String>,
}

impl Default for GeoAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N, BTreeMap::new())
    }
}

impl GeoAggregator {
    /// `metro_lookup` keys are "STATE|County"; they are normalized here so
    /// config files may use any casing or a trailing "County".
    pub fn new(top_n: usize, metro_lookup: BTreeMap<String, String>) -> Self {
        let metro_lookup = metro_lookup
            .into_iter()
            .filter_map(|(k, v)| {
                let (state, county) = k.split_once('|')?;
                Some((county_lookup_key(state, county), v))
            })
            .collect();
        Self { top_n, metro_lookup }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.top_n, config.metro_lookup.clone())
    }

    pub fn aggregate(&self, change_set: &ChangeSet) -> GeographicBreakdown {
        self.aggregate_all(std::iter::once(change_set))
    }

    /// Fold several change sets into one population (run-wide aggregates).
    pub fn aggregate_all<'a>(
        &self,
        change_sets: impl IntoIterator<Item = &'a ChangeSet>,
    ) -> GeographicBreakdown {
        let sets: Vec<&ChangeSet> = change_sets.into_iter().collect();
        let mut aggregates = Vec::with_capacity(6);

        for direction in Direction::ALL {
            for dimension in GeoDimension::ALL {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for cs in &sets {
                    for change in cs.records.iter().filter(|r| r.kind == direction.kind()) {
                        *counts.entry(self.group_key(&change.record, dimension)).or_default() += 1;
                    }
                }
                aggregates.push(self.rank(direction, dimension, counts));
            }
        }

        GeographicBreakdown { aggregates }
    }

    fn rank(
        &self,
        direction: Direction,
        dimension: GeoDimension,
        counts: BTreeMap<String, usize>,
    ) -> GeographicAggregate {
        let total = counts.values().sum();
        let group_count = counts.len();
        let mut ranked: Vec<GroupCount> = counts
            .into_iter()
            .map(|(group, count)| GroupCount { group, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.group.cmp(&b.group)));
        ranked.truncate(self.top_n);

        GeographicAggregate {
            dimension,
            direction,
            total,
            group_count,
            top: ranked,
        }
    }

    /// Canonical group label for one record along one dimension.
    pub fn group_key(&self, record: &BranchRecord, dimension: GeoDimension) -> String {
        let state = record
            .state
            .as_deref()
            .map(normalize_state)
            .filter(|s| !s.is_empty());

        match dimension {
            GeoDimension::State => state.unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
            GeoDimension::City => match non_blank(record.city.as_deref()) {
                Some(city) => match state {
                    Some(st) => format!("{}, {st}", title_case(&city)),
                    None => title_case(&city),
                },
                None => UNKNOWN_GROUP.to_string(),
            },
            GeoDimension::MetroArea => non_blank(record.metro_area.as_deref())
                .or_else(|| self.lookup_metro(record))
                .map(|m| canonical_metro(&m))
                .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
        }
    }

    fn lookup_metro(&self, record: &BranchRecord) -> Option<String> {
        let state = record.state.as_deref()?;
        let county = record.county.as_deref()?;
        self.metro_lookup.get(&county_lookup_key(state, county)).cloned()
    }
}

fn county_lookup_key(state: &str, county: &str) -> String {
    let county = collapse_whitespace(county).to_lowercase();
    let county = county.strip_suffix(" county").unwrap_or(&county);
    format!("{}|{county}", normalize_state(state))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(collapse_whitespace).filter(|v| !v.is_empty())
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalize the first letter of every alphabetic run:
/// "winston-salem" -> "Winston-Salem", "SPRINGFIELD" -> "Springfield".
fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() && !prev_alpha && ch != '\'' {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
        prev_alpha = ch.is_alphabetic() || ch == '\'';
    }
    out
}

/// Metro names end in a state list ("Chicago-Naperville-Elgin, IL-IN-WI");
/// title-case the name, uppercase the state list.
fn canonical_metro(raw: &str) -> String {
    match raw.rsplit_once(',') {
        Some((name, states)) => format!("{}, {}", title_case(name.trim()), states.trim().to_uppercase()),
        None => title_case(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff_engine::ChangeRecord, key::derive_key};

    fn change(kind: ChangeKind, state: Option<&str>, city: Option<&str>) -> ChangeRecord {
        let mut record = BranchRecord::new("628", 2024).with_coordinates(30.0, -90.0);
        record.state = state.map(str::to_string);
        record.city = city.map(str::to_string);
        ChangeRecord {
            kind,
            key: derive_key(&record).unwrap(),
            record,
        }
    }

    fn change_set(records: Vec<ChangeRecord>) -> ChangeSet {
        ChangeSet {
            institution_id: "628".into(),
            from_year: 2023,
            to_year: 2024,
            from_size: 0,
            to_size: 0,
            opened_count: 0,
            closed_count: 0,
            unchanged_count: 0,
            address_fallback_matches: 0,
            unresolved_from: 0,
            unresolved_to: 0,
            records,
        }
    }

    #[test]
    fn ranks_by_count_then_name() {
        let cs = change_set(vec![
            change(ChangeKind::Closed, Some("oh"), Some("Dayton")),
            change(ChangeKind::Closed, Some("OH"), Some("Akron")),
            change(ChangeKind::Closed, Some("MI"), Some("Flint")),
            change(ChangeKind::Closed, Some("IN"), Some("Gary")),
            change(ChangeKind::Opened, Some("TX"), Some("Austin")),
        ]);
        let breakdown = GeoAggregator::default().aggregate(&cs);
        let states = breakdown.top_groups(Direction::Closed, GeoDimension::State);
        let names: Vec<(&str, usize)> = states.iter().map(|g| (g.group.as_str(), g.count)).collect();
        assert_eq!(names, vec![("OH", 2), ("IN", 1), ("MI", 1)]);
        assert_eq!(breakdown.total(Direction::Opened), 1);
    }

    #[test]
    fn missing_values_are_bucketed_as_unknown() {
        let cs = change_set(vec![
            change(ChangeKind::Opened, None, None),
            change(ChangeKind::Opened, Some("GA"), None),
        ]);
        let breakdown = GeoAggregator::default().aggregate(&cs);
        let cities = breakdown.get(Direction::Opened, GeoDimension::City).unwrap();
        assert_eq!(cities.total, 2);
        assert_eq!(cities.top, vec![GroupCount { group: UNKNOWN_GROUP.into(), count: 2 }]);
        let metros = breakdown.get(Direction::Opened, GeoDimension::MetroArea).unwrap();
        assert_eq!(metros.top[0].group, UNKNOWN_GROUP);
    }

    #[test]
    fn cities_are_qualified_by_state_and_case_normalized() {
        let cs = change_set(vec![
            change(ChangeKind::Closed, Some("IL"), Some("SPRINGFIELD")),
            change(ChangeKind::Closed, Some("il"), Some("springfield")),
            change(ChangeKind::Closed, Some("MO"), Some("Springfield")),
        ]);
        let breakdown = GeoAggregator::default().aggregate(&cs);
        let cities = breakdown.top_groups(Direction::Closed, GeoDimension::City);
        assert_eq!(cities[0], GroupCount { group: "Springfield, IL".into(), count: 2 });
        assert_eq!(cities[1], GroupCount { group: "Springfield, MO".into(), count: 1 });
    }

    #[test]
    fn metro_falls_back_to_county_lookup() {
        let mut lookup = BTreeMap::new();
        lookup.insert("IL|Cook County".to_string(), "Chicago-Naperville-Elgin, IL-IN-WI".to_string());
        let agg = GeoAggregator::new(10, lookup);

        let record = BranchRecord::new("628", 2024).with_address("1 State St", "Chicago", "IL", "60601").with_county("cook");
        assert_eq!(agg.group_key(&record, GeoDimension::MetroArea), "Chicago-Naperville-Elgin, IL-IN-WI");

        let explicit = record.clone().with_metro_area("peoria, il");
        assert_eq!(agg.group_key(&explicit, GeoDimension::MetroArea), "Peoria, IL");
    }

    #[test]
    fn top_n_truncates_but_keeps_totals() {
        let states = ["AL", "AK", "AZ", "AR", "CA"];
        let cs = change_set(states.iter().map(|s| change(ChangeKind::Opened, Some(s), None)).collect());
        let breakdown = GeoAggregator::new(3, BTreeMap::new()).aggregate(&cs);
        let agg = breakdown.get(Direction::Opened, GeoDimension::State).unwrap();
        assert_eq!(agg.top.len(), 3);
        assert_eq!(agg.total, 5);
        assert_eq!(agg.group_count, 5);
        assert_eq!(agg.top[0].group, "AK");
    }

    #[test]
    fn title_case_handles_hyphens_and_apostrophes() {
        assert_eq!(title_case("winston-salem"), "Winston-Salem");
        assert_eq!(title_case("O'FALLON"), "O'fallon");
    }
}
