//! Temporal diff engine — classifies every branch instance between two
//! snapshots of the same institution.
//!
//! Algorithm:
//!   1. Primary pass: multiset difference on the primary key. For each key,
//!      min(count_y, count_y1) instances are Unchanged, excess in Y+1 is
//!      Opened, excess in Y is Closed.
//!   2. Address fallback: leftovers on both sides are paired by address
//!      key, but only when at least one record of the pair has no usable
//!      coordinates. A geocoded record on one side and an address-only
//!      record on the other are the same branch, not a close and an open.
//!
//! Conservation: closed - opened == size(Y) - size(Y+1) whenever neither
//! snapshot has unresolved records. Every matched pair removes exactly one
//! instance from each side, so the identity follows from the counts.

use crate::{
    error::{NetResult, NetworkError},
    key::{address_key, has_usable_coordinates, BranchKey},
    record::BranchRecord,
    snapshot::NetworkSnapshot,
    types::{InstitutionId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Unchanged,
    Opened,
    Closed,
}

/// One classified branch instance. `record` is the later-year record for
/// Unchanged and Opened, the earlier-year record for Closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind:   ChangeKind,
    pub key:    BranchKey,
    pub record: BranchRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub institution_id:           InstitutionId,
    pub from_year:                Year,
    pub to_year:                  Year,
    pub from_size:                usize,
    pub to_size:                  usize,
    pub opened_count:             usize,
    pub closed_count:             usize,
    pub unchanged_count:          usize,
    pub address_fallback_matches: usize,
    pub unresolved_from:          usize,
    pub unresolved_to:            usize,
    pub records:                  Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn opened(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| r.kind == ChangeKind::Opened)
    }

    pub fn closed(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| r.kind == ChangeKind::Closed)
    }

    /// Records on either side that never entered matching.
    pub fn unresolved_count(&self) -> usize {
        self.unresolved_from + self.unresolved_to
    }

    /// size(Y+1) - size(Y).
    pub fn net_change(&self) -> i64 {
        self.to_size as i64 - self.from_size as i64
    }

    /// closed - opened as observed by matching.
    pub fn observed_net_closures(&self) -> i64 {
        self.closed_count as i64 - self.opened_count as i64
    }

    /// Whether closed - opened == size(Y) - size(Y+1). Always true when
    /// unresolved_count() is zero.
    pub fn conservation_holds(&self) -> bool {
        self.observed_net_closures() == -self.net_change()
    }
}

struct Leftover<'a> {
    key:     &'a BranchKey,
    record:  &'a BranchRecord,
    matched: bool,
}

/// Compare snapshot Y against snapshot Y+1.
pub fn diff(from: &NetworkSnapshot, to: &NetworkSnapshot) -> NetResult<ChangeSet> {
    if from.institution_id != to.institution_id {
        return Err(NetworkError::InstitutionMismatch {
            left:  from.institution_id.clone(),
            right: to.institution_id.clone(),
        });
    }

    let mut records: Vec<ChangeRecord> = Vec::new();
    let mut closed_left: Vec<Leftover> = Vec::new();
    let mut opened_left: Vec<Leftover> = Vec::new();

    // ── Pass 1: primary key multiset ─────────────────────────────
    let keys: BTreeSet<&BranchKey> = from
        .entries()
        .chain(to.entries())
        .map(|(k, _)| k)
        .collect();

    for key in keys {
        let before = from.records_for(key);
        let after = to.records_for(key);
        let kept = before.len().min(after.len());

        for record in &after[..kept] {
            records.push(ChangeRecord {
                kind:   ChangeKind::Unchanged,
                key:    key.clone(),
                record: record.clone(),
            });
        }
        closed_left.extend(before[kept..].iter().map(|record| Leftover { key, record, matched: false }));
        opened_left.extend(after[kept..].iter().map(|record| Leftover { key, record, matched: false }));
    }

    // ── Pass 2: address fallback ─────────────────────────────────
    let address_fallback_matches = match_by_address(&mut closed_left, &mut opened_left, &mut records);

    for left in closed_left.iter().filter(|l| !l.matched) {
        records.push(ChangeRecord {
            kind:   ChangeKind::Closed,
            key:    left.key.clone(),
            record: left.record.clone(),
        });
    }
    for left in opened_left.iter().filter(|l| !l.matched) {
        records.push(ChangeRecord {
            kind:   ChangeKind::Opened,
            key:    left.key.clone(),
            record: left.record.clone(),
        });
    }

    records.sort_by(|a, b| a.key.cmp(&b.key).then(a.kind.cmp(&b.kind)));

    let count = |kind: ChangeKind| records.iter().filter(|r| r.kind == kind).count();
    let opened_count = count(ChangeKind::Opened);
    let closed_count = count(ChangeKind::Closed);
    let unchanged_count = count(ChangeKind::Unchanged);

    log::debug!(
        "diff {} {}→{}: {unchanged_count} unchanged, {opened_count} opened, {closed_count} closed ({address_fallback_matches} via address)",
        from.institution_id,
        from.year,
        to.year,
    );

    Ok(ChangeSet {
        institution_id: from.institution_id.clone(),
        from_year: from.year,
        to_year: to.year,
        from_size: from.network_size(),
        to_size: to.network_size(),
        opened_count,
        closed_count,
        unchanged_count,
        address_fallback_matches,
        unresolved_from: from.unresolved().len(),
        unresolved_to: to.unresolved().len(),
        records,
    })
}

/// Pair leftovers sharing an address key where at least one side lacks
/// coordinates. Two geocoded records at different points are never merged
/// here, even at the same street address. Returns the number of pairs.
fn match_by_address(
    closed: &mut [Leftover],
    opened: &mut [Leftover],
    out: &mut Vec<ChangeRecord>,
) -> usize {
    // address key -> (closed indices, opened indices)
    let mut groups: BTreeMap<BranchKey, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, left) in closed.iter().enumerate() {
        if let Some(ak) = address_key(left.record) {
            groups.entry(ak).or_default().0.push(i);
        }
    }
    for (i, left) in opened.iter().enumerate() {
        if let Some(ak) = address_key(left.record) {
            groups.entry(ak).or_default().1.push(i);
        }
    }

    let mut pairs = 0;
    for (closed_idx, opened_idx) in groups.values() {
        if closed_idx.is_empty() || opened_idx.is_empty() {
            continue;
        }
        let (closed_geo, closed_bare): (Vec<usize>, Vec<usize>) = closed_idx
            .iter()
            .partition(|&&i| has_usable_coordinates(closed[i].record));
        let (opened_geo, opened_bare): (Vec<usize>, Vec<usize>) = opened_idx
            .iter()
            .partition(|&&i| has_usable_coordinates(opened[i].record));

        // Two address-only records with the same address share a primary
        // key, so pass 1 already consumed those pairs.
        let candidates = closed_bare
            .iter()
            .zip(opened_geo.iter())
            .chain(closed_geo.iter().zip(opened_bare.iter()));

        for (&c, &o) in candidates {
            closed[c].matched = true;
            opened[o].matched = true;
            out.push(ChangeRecord {
                kind:   ChangeKind::Unchanged,
                key:    opened[o].key.clone(),
                record: opened[o].record.clone(),
            });
            pairs += 1;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyNormalizer;

    fn snap(year: Year, records: Vec<BranchRecord>) -> NetworkSnapshot {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.year = year;
                r
            })
            .collect();
        NetworkSnapshot::build("628", year, records, &KeyNormalizer::default()).unwrap()
    }

    fn at(lat: f64, lon: f64) -> BranchRecord {
        BranchRecord::new("628", 0).with_coordinates(lat, lon)
    }

    #[test]
    fn colocated_windows_stay_unchanged() {
        let windows = || {
            vec![
                at(35.2271, -80.8431).with_service_type("full_service"),
                at(35.2271, -80.8431).with_service_type("drive_through"),
            ]
        };
        let cs = diff(&snap(2023, windows()), &snap(2024, windows())).unwrap();
        assert_eq!(cs.unchanged_count, 2);
        assert_eq!(cs.opened_count, 0);
        assert_eq!(cs.closed_count, 0);
    }

    #[test]
    fn excess_multiplicity_is_classified() {
        let before = vec![at(35.2271, -80.8431), at(35.2271, -80.8431)];
        let after = vec![at(35.2271, -80.8431), at(36.0, -80.0), at(36.0, -80.0)];
        let cs = diff(&snap(2023, before), &snap(2024, after)).unwrap();
        assert_eq!(cs.unchanged_count, 1);
        assert_eq!(cs.closed_count, 1);
        assert_eq!(cs.opened_count, 2);
        assert!(cs.conservation_holds());
    }

    #[test]
    fn identical_snapshots_produce_no_churn() {
        let records = || vec![at(30.0, -97.0), at(30.1, -97.1), at(30.2, -97.2)];
        let cs = diff(&snap(2023, records()), &snap(2024, records())).unwrap();
        assert_eq!((cs.opened_count, cs.closed_count), (0, 0));
        assert_eq!(cs.unchanged_count, 3);
    }

    #[test]
    fn address_only_record_matches_geocoded_record() {
        let geocoded = at(39.9612, -82.9988).with_address("10 Broad Street", "Columbus", "OH", "43215");
        let bare = BranchRecord::new("628", 0).with_address("10 Broad St", "Columbus", "OH", "43215");
        let cs = diff(&snap(2023, vec![geocoded]), &snap(2024, vec![bare])).unwrap();
        assert_eq!(cs.unchanged_count, 1);
        assert_eq!(cs.address_fallback_matches, 1);
        assert_eq!((cs.opened_count, cs.closed_count), (0, 0));
    }

    #[test]
    fn geocoded_records_at_different_points_are_not_merged_by_address() {
        let a = at(39.9612, -82.9988).with_address("10 Broad St", "Columbus", "OH", "43215");
        let b = at(39.9700, -82.9988).with_address("10 Broad St", "Columbus", "OH", "43215");
        let cs = diff(&snap(2023, vec![a]), &snap(2024, vec![b])).unwrap();
        assert_eq!((cs.opened_count, cs.closed_count), (1, 1));
        assert_eq!(cs.address_fallback_matches, 0);
    }

    #[test]
    fn unresolved_records_break_conservation_visibly() {
        let before = vec![at(30.0, -97.0), BranchRecord::new("628", 0).with_name("Kiosk")];
        let after = vec![at(30.0, -97.0)];
        let cs = diff(&snap(2023, before), &snap(2024, after)).unwrap();
        assert_eq!(cs.unresolved_count(), 1);
        assert_eq!(cs.closed_count, 0);
        assert!(!cs.conservation_holds());
    }

    #[test]
    fn diff_is_idempotent() {
        let before = vec![at(30.0, -97.0), at(31.0, -97.0)];
        let after = vec![at(31.0, -97.0), at(32.0, -97.0)];
        let (a, b) = (snap(2023, before), snap(2024, after));
        assert_eq!(diff(&a, &b).unwrap(), diff(&a, &b).unwrap());
    }

    #[test]
    fn mismatched_institutions_are_rejected() {
        let other = NetworkSnapshot::build("999", 2024, vec![], &KeyNormalizer::default()).unwrap();
        let err = diff(&snap(2023, vec![]), &other).unwrap_err();
        assert!(matches!(err, NetworkError::InstitutionMismatch { .. }));
    }
}
