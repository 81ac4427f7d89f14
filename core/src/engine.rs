//! The network analysis orchestrator.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Validate the request (institution present, at least one year).
//!   2. Load one snapshot per requested year (sequential or fanned out).
//!   3. Sort by year, key every record into a NetworkSnapshot.
//!   4. Diff each consecutive requested pair where both years loaded.
//!   5. Aggregate geography per interval and across the run.
//!   6. Synthesize the narrative once over the whole run.
//!
//! RULES:
//!   - Only step 2 may block; everything after it is pure computation.
//!   - Gap years and unresolved branches become report issues, never errors.
//!   - InstitutionNotFound, an empty request or cancellation abort the run
//!     and nothing partial is returned.
//!   - Output never depends on the order snapshots finished loading.

use crate::{
    config::AnalysisConfig,
    diff_engine::{diff, ChangeSet},
    error::{NetResult, NetworkError},
    geo_aggregator::GeoAggregator,
    key::KeyNormalizer,
    loader::SnapshotLoader,
    narrative::NarrativeSynthesizer,
    record::BranchRecord,
    report::{percent_change, AnalysisIssue, IntervalDelta, NetworkAnalysisReport, YearSummary},
    snapshot::NetworkSnapshot,
    types::Year,
};
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Unresolved branch labels listed per year in the report; the count is
/// always exact.
const MAX_UNRESOLVED_LISTED: usize = 25;

/// Upper bound on loader threads alive at once in `analyze_concurrent`.
pub const MAX_LOAD_THREADS: usize = 8;

type Fetched = (Year, NetResult<Option<Vec<BranchRecord>>>);

/// Shared cancellation signal, checked between year boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> NetResult<()> {
        if self.is_cancelled() {
            Err(NetworkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct NetworkAnalyzer<L> {
    loader:      L,
    config:      AnalysisConfig,
    normalizer:  KeyNormalizer,
    aggregator:  GeoAggregator,
    synthesizer: NarrativeSynthesizer,
}

impl<L: SnapshotLoader> NetworkAnalyzer<L> {
    pub fn new(loader: L, config: AnalysisConfig) -> Self {
        Self {
            normalizer:  KeyNormalizer::new(config.coordinate_precision),
            aggregator:  GeoAggregator::from_config(&config),
            synthesizer: NarrativeSynthesizer::from_config(&config),
            loader,
            config,
        }
    }

    pub fn with_defaults(loader: L) -> Self {
        Self::new(loader, AnalysisConfig::default())
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn analyze(&self, institution_id: &str, years: &[Year]) -> NetResult<NetworkAnalysisReport> {
        self.analyze_with_cancel(institution_id, years, &CancelFlag::new())
    }

    /// Sequential loading. Cancellation is honoured before every load and
    /// every interval diff.
    pub fn analyze_with_cancel(
        &self,
        institution_id: &str,
        years: &[Year],
        cancel: &CancelFlag,
    ) -> NetResult<NetworkAnalysisReport> {
        let years = validate_request(institution_id, years)?;
        log::info!("Analyzing {institution_id} over {} year(s)", years.len());

        let mut fetched: Vec<Fetched> = Vec::with_capacity(years.len());
        for &year in &years {
            cancel.check()?;
            fetched.push((year, self.loader.get_branches(institution_id, year)));
        }
        self.assemble(institution_id, years, fetched, cancel)
    }

    fn assemble(
        &self,
        institution_id: &str,
        years: Vec<Year>,
        mut fetched: Vec<Fetched>,
        cancel: &CancelFlag,
    ) -> NetResult<NetworkAnalysisReport> {
        fetched.sort_by_key(|(year, _)| *year);

        let mut issues = Vec::new();
        let mut snapshots: BTreeMap<Year, NetworkSnapshot> = BTreeMap::new();

        for (year, result) in fetched {
            match result {
                Err(NetworkError::InstitutionNotFound { institution_id }) => {
                    return Err(NetworkError::InstitutionNotFound { institution_id });
                }
                Err(e) => {
                    log::warn!("Loading {institution_id}/{year} failed: {e}");
                    issues.push(AnalysisIssue::LoadFailed { year, message: e.to_string() });
                }
                Ok(None) => {
                    log::warn!("No snapshot for {institution_id}/{year}");
                    issues.push(AnalysisIssue::MissingSnapshot { year });
                }
                Ok(Some(records)) if records.is_empty() => {
                    log::warn!("Empty snapshot for {institution_id}/{year}");
                    issues.push(AnalysisIssue::MissingSnapshot { year });
                }
                Ok(Some(records)) => {
                    match NetworkSnapshot::build(institution_id, year, records, &self.normalizer) {
                        Ok(snapshot) => {
                            if let Some(issue) = unresolved_issue(&snapshot) {
                                issues.push(issue);
                            }
                            snapshots.insert(year, snapshot);
                        }
                        Err(e) => {
                            log::warn!("Snapshot {institution_id}/{year} rejected: {e}");
                            issues.push(AnalysisIssue::LoadFailed { year, message: e.to_string() });
                        }
                    }
                }
            }
        }

        let mut change_sets: Vec<ChangeSet> = Vec::new();
        let mut intervals: Vec<IntervalDelta> = Vec::new();

        for pair in years.windows(2) {
            cancel.check()?;
            let (from_year, to_year) = (pair[0], pair[1]);
            let (Some(from), Some(to)) = (snapshots.get(&from_year), snapshots.get(&to_year)) else {
                log::warn!("Data gap for {institution_id}: {from_year}→{to_year} not diffed");
                issues.push(AnalysisIssue::DataGap { from_year, to_year });
                continue;
            };

            let change_set = diff(from, to)?;
            if !change_set.conservation_holds() {
                log::warn!(
                    "{institution_id} {from_year}→{to_year}: closed - opened = {} but size change implies {} ({} unresolved)",
                    change_set.observed_net_closures(),
                    -change_set.net_change(),
                    change_set.unresolved_count()
                );
                issues.push(AnalysisIssue::ConservationMismatch {
                    from_year,
                    to_year,
                    expected_net_closures: -change_set.net_change(),
                    observed_net_closures: change_set.observed_net_closures(),
                    unresolved_count:      change_set.unresolved_count(),
                });
            }
            intervals.push(self.interval_delta(&change_set));
            change_sets.push(change_set);
        }

        let geography = self.aggregator.aggregate_all(&change_sets);
        let sizes: Vec<(Year, usize)> = snapshots
            .values()
            .map(|s| (s.year, s.network_size()))
            .collect();
        let narrative = self.synthesizer.synthesize(&sizes, &geography, intervals.len());

        log::info!(
            "Analysis of {institution_id} complete: {} snapshot(s), {} interval(s), {} issue(s)",
            snapshots.len(),
            intervals.len(),
            issues.len()
        );

        Ok(NetworkAnalysisReport {
            institution_id: institution_id.to_string(),
            years_requested: years,
            years: snapshots.values().map(year_summary).collect(),
            intervals,
            geography,
            narrative,
            issues,
        })
    }

    fn interval_delta(&self, cs: &ChangeSet) -> IntervalDelta {
        let mut delta = IntervalDelta {
            from_year:                cs.from_year,
            to_year:                  cs.to_year,
            from_size:                cs.from_size,
            to_size:                  cs.to_size,
            delta:                    cs.net_change(),
            delta_pct:                percent_change(cs.from_size, cs.to_size),
            opened:                   cs.opened_count,
            closed:                   cs.closed_count,
            unchanged:                cs.unchanged_count,
            address_fallback_matches: cs.address_fallback_matches,
            unresolved_count:         cs.unresolved_count(),
            conservation_holds:       cs.conservation_holds(),
            geography:                self.aggregator.aggregate(cs),
            note:                     String::new(),
        };
        delta.note = self.synthesizer.describe_interval(&delta);
        log::debug!("{}", delta.note);
        delta
    }
}

impl<L: SnapshotLoader + Sync> NetworkAnalyzer<L> {
    /// Load years on scoped threads, at most `MAX_LOAD_THREADS` at a time,
    /// then proceed exactly as `analyze_with_cancel`. Results are re-sorted
    /// by year before diffing.
    pub fn analyze_concurrent(
        &self,
        institution_id: &str,
        years: &[Year],
        cancel: &CancelFlag,
    ) -> NetResult<NetworkAnalysisReport> {
        let years = validate_request(institution_id, years)?;
        cancel.check()?;
        log::info!("Analyzing {institution_id} over {} year(s), concurrent load", years.len());

        let loader = &self.loader;
        let mut fetched: Vec<Fetched> = Vec::with_capacity(years.len());
        for batch in years.chunks(MAX_LOAD_THREADS) {
            cancel.check()?;
            std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&year| scope.spawn(move || (year, loader.get_branches(institution_id, year))))
                    .collect();
                fetched.extend(
                    handles
                        .into_iter()
                        .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))),
                );
            });
        }

        cancel.check()?;
        self.assemble(institution_id, years, fetched, cancel)
    }
}

/// Sorted, de-duplicated years, or the reason the run cannot start.
fn validate_request(institution_id: &str, years: &[Year]) -> NetResult<Vec<Year>> {
    if institution_id.trim().is_empty() {
        return Err(NetworkError::InstitutionNotFound {
            institution_id: institution_id.to_string(),
        });
    }
    if years.is_empty() {
        return Err(NetworkError::NoYearsRequested);
    }
    let mut years = years.to_vec();
    years.sort_unstable();
    years.dedup();
    Ok(years)
}

fn unresolved_issue(snapshot: &NetworkSnapshot) -> Option<AnalysisIssue> {
    let unresolved = snapshot.unresolved();
    if unresolved.is_empty() {
        return None;
    }
    log::warn!(
        "{}/{}: {} branch record(s) could not be located",
        snapshot.institution_id,
        snapshot.year,
        unresolved.len()
    );
    Some(AnalysisIssue::UnresolvedBranches {
        year:     snapshot.year,
        count:    unresolved.len(),
        branches: unresolved
            .iter()
            .take(MAX_UNRESOLVED_LISTED)
            .map(BranchRecord::label)
            .collect(),
    })
}

fn year_summary(snapshot: &NetworkSnapshot) -> YearSummary {
    YearSummary {
        year:             snapshot.year,
        network_size:     snapshot.network_size(),
        resolved_count:   snapshot.resolved_count(),
        distinct_keys:    snapshot.distinct_keys(),
        unresolved_count: snapshot.unresolved().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;

    fn loader_with(years: &[Year]) -> InMemoryLoader {
        let mut loader = InMemoryLoader::new();
        for &year in years {
            loader.insert_records(vec![
                BranchRecord::new("628", year).with_coordinates(40.0, -80.0).with_address("1 A St", "Erie", "PA", "16501"),
            ]);
        }
        loader
    }

    #[test]
    fn empty_request_is_a_hard_failure() {
        let analyzer = NetworkAnalyzer::with_defaults(loader_with(&[2020]));
        assert!(matches!(analyzer.analyze("628", &[]), Err(NetworkError::NoYearsRequested)));
        assert!(matches!(
            analyzer.analyze("  ", &[2020]),
            Err(NetworkError::InstitutionNotFound { .. })
        ));
    }

    #[test]
    fn unknown_institution_is_a_hard_failure() {
        let analyzer = NetworkAnalyzer::with_defaults(loader_with(&[2020]));
        assert!(matches!(
            analyzer.analyze("999", &[2020, 2021]),
            Err(NetworkError::InstitutionNotFound { .. })
        ));
    }

    #[test]
    fn years_are_sorted_and_deduplicated() {
        let analyzer = NetworkAnalyzer::with_defaults(loader_with(&[2020, 2021, 2022]));
        let report = analyzer.analyze("628", &[2022, 2020, 2021, 2020]).unwrap();
        assert_eq!(report.years_requested, vec![2020, 2021, 2022]);
        assert_eq!(report.intervals.len(), 2);
        assert!(report.issues.is_empty());
    }

    /// Counts how many `get_branches` calls overlap.
    struct CountingLoader {
        inner:     InMemoryLoader,
        in_flight: std::sync::atomic::AtomicUsize,
        peak:      std::sync::atomic::AtomicUsize,
    }

    impl SnapshotLoader for CountingLoader {
        fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            let result = self.inner.get_branches(institution_id, year);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn concurrent_load_is_bounded_and_matches_sequential() {
        let years: Vec<Year> = (1990..2030).collect();
        let analyzer = NetworkAnalyzer::with_defaults(CountingLoader {
            inner:     loader_with(&years),
            in_flight: Default::default(),
            peak:      Default::default(),
        });

        let concurrent = analyzer.analyze_concurrent("628", &years, &CancelFlag::new()).unwrap();
        assert!(analyzer.loader().peak.load(Ordering::SeqCst) <= MAX_LOAD_THREADS);

        let sequential = analyzer.analyze("628", &years).unwrap();
        assert_eq!(concurrent, sequential);
        assert_eq!(concurrent.intervals.len(), years.len() - 1);
    }

    #[test]
    fn cancelled_run_returns_nothing() {
        let analyzer = NetworkAnalyzer::with_defaults(loader_with(&[2020, 2021]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            analyzer.analyze_with_cancel("628", &[2020, 2021], &cancel),
            Err(NetworkError::Cancelled)
        ));
    }
}
