//! The network analysis report — a plain data structure, no behaviour
//! beyond read-only accessors.
//!
//! RULE: per-year and per-record problems are data here (`issues`), never
//! raised errors. A partial, annotated report beats no report.

use crate::{
    geo_aggregator::GeographicBreakdown,
    types::{InstitutionId, Year},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year:             Year,
    /// Every record reported for the year, keyed or not.
    pub network_size:     usize,
    pub resolved_count:   usize,
    pub distinct_keys:    usize,
    pub unresolved_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalDelta {
    pub from_year:                Year,
    pub to_year:                  Year,
    pub from_size:                usize,
    pub to_size:                  usize,
    pub delta:                    i64,
    /// One decimal place. None when the earlier year had no branches.
    pub delta_pct:                Option<f64>,
    pub opened:                   usize,
    pub closed:                   usize,
    pub unchanged:                usize,
    pub address_fallback_matches: usize,
    pub unresolved_count:         usize,
    pub conservation_holds:       bool,
    pub geography:                GeographicBreakdown,
    pub note:                     String,
}

impl IntervalDelta {
    /// "-19 (-1.7%)".
    pub fn display_delta(&self) -> String {
        match self.delta_pct {
            Some(pct) => format!("{:+} ({})", self.delta, format_signed_pct(pct)),
            None => format!("{:+}", self.delta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisIssue {
    /// The loader had no data for a requested year.
    MissingSnapshot { year: Year },
    /// A year boundary that could not be diffed because one side is missing.
    DataGap { from_year: Year, to_year: Year },
    /// Records excluded from matching for lack of a usable locator.
    UnresolvedBranches {
        year:     Year,
        count:    usize,
        branches: Vec<String>,
    },
    /// The loader failed for one year; treated as a gap.
    LoadFailed { year: Year, message: String },
    /// closed - opened disagreed with size(Y) - size(Y+1).
    ConservationMismatch {
        from_year:             Year,
        to_year:               Year,
        expected_net_closures: i64,
        observed_net_closures: i64,
        unresolved_count:      usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysisReport {
    pub institution_id:  InstitutionId,
    pub years_requested: Vec<Year>,
    pub years:           Vec<YearSummary>,
    pub intervals:       Vec<IntervalDelta>,
    /// Run-wide aggregates over every diffed interval.
    pub geography:       GeographicBreakdown,
    pub narrative:       String,
    pub issues:          Vec<AnalysisIssue>,
}

impl NetworkAnalysisReport {
    pub fn interval(&self, from_year: Year, to_year: Year) -> Option<&IntervalDelta> {
        self.intervals
            .iter()
            .find(|i| i.from_year == from_year && i.to_year == to_year)
    }

    pub fn year(&self, year: Year) -> Option<&YearSummary> {
        self.years.iter().find(|y| y.year == year)
    }

    /// (from, to) for every boundary that could not be diffed.
    pub fn data_gaps(&self) -> Vec<(Year, Year)> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                AnalysisIssue::DataGap { from_year, to_year } => Some((*from_year, *to_year)),
                _ => None,
            })
            .collect()
    }

    pub fn total_unresolved(&self) -> usize {
        self.years.iter().map(|y| y.unresolved_count).sum()
    }

    pub fn network_sizes(&self) -> Vec<(Year, usize)> {
        self.years.iter().map(|y| (y.year, y.network_size)).collect()
    }
}

/// Percentage change rounded to one decimal place, half away from zero.
pub fn percent_change(from: usize, to: usize) -> Option<f64> {
    if from == 0 {
        return None;
    }
    let pct = (to as f64 - from as f64) / from as f64 * 100.0;
    Some(round1(pct))
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// "+1.8%", "-0.4%", "0.0%".
pub fn format_signed_pct(pct: f64) -> String {
    if pct == 0.0 {
        "0.0%".to_string()
    } else {
        format!("{pct:+.1}%")
    }
}
