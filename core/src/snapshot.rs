//! Network snapshot — one institution's keyed branch multiset for one year.
//!
//! Each key maps to every raw record that normalized to it, so
//! multiplicity (co-located full-service and drive-through windows, for
//! instance) survives into the diff. Records that could not be keyed are
//! kept aside as unresolved rather than dropped.

use crate::{
    error::{NetResult, NetworkError},
    key::{BranchKey, KeyNormalizer},
    record::BranchRecord,
    types::{InstitutionId, Year},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSnapshot {
    pub institution_id: InstitutionId,
    pub year:           Year,
    entries:            BTreeMap<BranchKey, Vec<BranchRecord>>,
    unresolved:         Vec<BranchRecord>,
}

impl NetworkSnapshot {
    /// Key every record and group them. The result is independent of the
    /// order `records` arrive in.
    pub fn build(
        institution_id: &str,
        year: Year,
        records: Vec<BranchRecord>,
        normalizer: &KeyNormalizer,
    ) -> NetResult<Self> {
        let mut entries: BTreeMap<BranchKey, Vec<BranchRecord>> = BTreeMap::new();
        let mut unresolved = Vec::new();

        for record in records {
            if record.institution_id != institution_id {
                return Err(NetworkError::InstitutionMismatch {
                    left:  institution_id.to_string(),
                    right: record.institution_id,
                });
            }
            match normalizer.derive_key(&record) {
                Ok(key) => entries.entry(key).or_default().push(record),
                Err(NetworkError::UnlocatableBranch { .. }) => unresolved.push(record),
                Err(e) => return Err(e),
            }
        }

        for group in entries.values_mut() {
            group.sort_by_key(|r| r.sort_key());
        }
        unresolved.sort_by_key(|r| r.sort_key());

        Ok(Self {
            institution_id: institution_id.to_string(),
            year,
            entries,
            unresolved,
        })
    }

    /// Every record the institution reported for the year, keyed or not.
    pub fn network_size(&self) -> usize {
        self.resolved_count() + self.unresolved.len()
    }

    /// Sum of multiplicities over all keys.
    pub fn resolved_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn multiplicity(&self, key: &BranchKey) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    pub fn records_for(&self, key: &BranchKey) -> &[BranchRecord] {
        self.entries.get(key).map_or(&[][..], Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&BranchKey, &[BranchRecord])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn unresolved(&self) -> &[BranchRecord] {
        &self.unresolved
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unresolved.is_empty()
    }
}
