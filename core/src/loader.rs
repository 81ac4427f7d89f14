//! Collaborator seams: where branch records and institution ids come from.
//!
//! The engine never cares how a snapshot is produced (warehouse query,
//! file, API call). It only needs results for a given (institution, year)
//! to be stable within one analysis run.

use crate::{
    error::{NetResult, NetworkError},
    record::BranchRecord,
    types::{InstitutionId, Year},
};
use std::collections::{BTreeMap, BTreeSet};

pub trait SnapshotLoader {
    /// Branch records for one institution and one year.
    ///
    /// - `Ok(None)`: the institution exists but there is no data for `year`.
    /// - `Err(InstitutionNotFound)`: the institution is unknown altogether.
    fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>>;
}

impl<L: SnapshotLoader + ?Sized> SnapshotLoader for &L {
    fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>> {
        (**self).get_branches(institution_id, year)
    }
}

/// Maps a free-text institution name to its id.
pub trait InstitutionResolver {
    fn resolve_institution(&self, name: &str) -> NetResult<Option<InstitutionId>>;
}

/// Map-backed loader for tests and callers that already hold the data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    snapshots:    BTreeMap<(InstitutionId, Year), Vec<BranchRecord>>,
    institutions: BTreeSet<InstitutionId>,
    names:        BTreeMap<String, InstitutionId>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// File records under their own (institution, year).
    pub fn insert_records(&mut self, records: impl IntoIterator<Item = BranchRecord>) {
        for record in records {
            self.institutions.insert(record.institution_id.clone());
            self.snapshots
                .entry((record.institution_id.clone(), record.year))
                .or_default()
                .push(record);
        }
    }

    /// Register an institution, optionally with no snapshots at all.
    pub fn register_institution(&mut self, institution_id: &str, name: &str) {
        self.institutions.insert(institution_id.to_string());
        self.names
            .insert(name.trim().to_lowercase(), institution_id.to_string());
    }

    pub fn years_for(&self, institution_id: &str) -> Vec<Year> {
        self.snapshots
            .keys()
            .filter(|(id, _)| id == institution_id)
            .map(|(_, year)| *year)
            .collect()
    }
}

impl SnapshotLoader for InMemoryLoader {
    fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>> {
        if !self.institutions.contains(institution_id) {
            return Err(NetworkError::InstitutionNotFound {
                institution_id: institution_id.to_string(),
            });
        }
        Ok(self
            .snapshots
            .get(&(institution_id.to_string(), year))
            .cloned())
    }
}

impl InstitutionResolver for InMemoryLoader {
    fn resolve_institution(&self, name: &str) -> NetResult<Option<InstitutionId>> {
        Ok(self.names.get(&name.trim().to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_missing_year_from_unknown_institution() {
        let mut loader = InMemoryLoader::new();
        loader.insert_records(vec![BranchRecord::new("628", 2023).with_coordinates(30.0, -90.0)]);

        assert_eq!(loader.get_branches("628", 2023).unwrap().map(|r| r.len()), Some(1));
        assert!(loader.get_branches("628", 2024).unwrap().is_none());
        assert!(matches!(
            loader.get_branches("999", 2023),
            Err(NetworkError::InstitutionNotFound { .. })
        ));
    }

    #[test]
    fn resolves_names_case_insensitively() {
        let mut loader = InMemoryLoader::new();
        loader.register_institution("628", "First Example Bank");
        assert_eq!(
            loader.resolve_institution("  first example BANK ").unwrap().as_deref(),
            Some("628")
        );
        assert_eq!(loader.resolve_institution("Nobody").unwrap(), None);
    }
}
