//! Narrative synthesizer — fixed sentence templates over the numeric
//! outputs.
//!
//! RULE: the narrative consumes only network sizes and geographic
//! aggregates. It holds no state and adds no information, so the same
//! inputs always yield the same text.

use crate::{
    config::{AnalysisConfig, DEFAULT_NARRATIVE_TOP_N, DEFAULT_STABLE_BAND_PCT},
    geo_aggregator::{Direction, GeoDimension, GeographicBreakdown, GroupCount, UNKNOWN_GROUP},
    report::{format_signed_pct, percent_change, round1, IntervalDelta},
    types::Year,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Growing,
    Shrinking,
    Stable,
}

pub struct NarrativeSynthesizer {
    stable_band_pct: f64,
    top_n:           usize,
}

impl Default for NarrativeSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_BAND_PCT, DEFAULT_NARRATIVE_TOP_N)
    }
}

impl NarrativeSynthesizer {
    pub fn new(stable_band_pct: f64, top_n: usize) -> Self {
        Self { stable_band_pct, top_n }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.stable_band_pct, config.narrative_top_n)
    }

    /// Classify against the unrounded change. The rounded percentage is
    /// for display only.
    pub fn trend(&self, first: usize, last: usize) -> Trend {
        if first == 0 {
            return if last > 0 { Trend::Growing } else { Trend::Stable };
        }
        // |last - first| / first * 100 <= band, kept free of division.
        let delta = last.abs_diff(first) as f64 * 100.0;
        if delta <= self.stable_band_pct * first as f64 {
            Trend::Stable
        } else if last > first {
            Trend::Growing
        } else {
            Trend::Shrinking
        }
    }

    /// Trend sentence, then one sentence per direction. Direction totals
    /// only mean something when `compared_intervals` is non-zero; with
    /// every boundary a gap the prose says so instead of reporting zeros.
    pub fn synthesize(
        &self,
        sizes: &[(Year, usize)],
        geography: &GeographicBreakdown,
        compared_intervals: usize,
    ) -> String {
        let mut sizes = sizes.to_vec();
        sizes.sort_by_key(|(year, _)| *year);

        let mut sentences = vec![self.trend_sentence(&sizes)];
        if sizes.len() > 1 {
            if compared_intervals == 0 {
                sentences.push(
                    "Openings and closures could not be determined because no consecutive years were both available."
                        .to_string(),
                );
            } else {
                sentences.push(self.direction_sentence(Direction::Opened, geography));
                sentences.push(self.direction_sentence(Direction::Closed, geography));
            }
        }
        sentences.join(" ")
    }

    fn trend_sentence(&self, sizes: &[(Year, usize)]) -> String {
        let (Some(&(first_year, first)), Some(&(last_year, last))) = (sizes.first(), sizes.last()) else {
            return "No branch data was available for the requested period.".to_string();
        };
        if sizes.len() == 1 {
            return format!(
                "The branch network comprised {} branches in {first_year}.",
                with_commas(first)
            );
        }

        let change = match percent_change(first, last) {
            Some(pct) => format!(" ({})", format_signed_pct(pct)),
            None => String::new(),
        };
        let span = (last_year - first_year).max(1) as f64;
        let pace = round1((last as f64 - first as f64) / span);
        let endpoints = format!(
            "from {} branches in {first_year} to {} in {last_year}{change}",
            with_commas(first),
            with_commas(last)
        );

        match self.trend(first, last) {
            Trend::Stable => format!(
                "The branch network remained relatively stable, moving {endpoints}, an average net change of {} branches per year.",
                format_pace(pace)
            ),
            Trend::Growing => format!(
                "The branch network grew {endpoints}, adding an average of {:.1} branches per year.",
                pace.abs()
            ),
            Trend::Shrinking => format!(
                "The branch network contracted {endpoints}, losing an average of {:.1} branches per year.",
                pace.abs()
            ),
        }
    }

    fn direction_sentence(&self, direction: Direction, geography: &GeographicBreakdown) -> String {
        let (noun, lower) = match direction {
            Direction::Opened => ("Openings", "openings"),
            Direction::Closed => ("Closures", "closures"),
        };
        let total = geography.total(direction);
        if total == 0 {
            return format!("No branch {lower} were recorded over the period.");
        }

        let named = self.named_groups(geography.top_groups(direction, GeoDimension::State));
        if named.is_empty() {
            return format!("{noun} totaled {}, with no state recorded.", with_commas(total));
        }
        format!(
            "{noun} totaled {}, concentrated in {}.",
            with_commas(total),
            oxford_join(&named)
        )
    }

    fn named_groups(&self, groups: &[GroupCount]) -> Vec<String> {
        groups
            .iter()
            .filter(|g| g.group != UNKNOWN_GROUP)
            .take(self.top_n)
            .map(|g| format!("{} ({})", display_state(&g.group), with_commas(g.count)))
            .collect()
    }

    /// One-line note for a single interval.
    pub fn describe_interval(&self, interval: &IntervalDelta) -> String {
        let mut note = format!(
            "{} to {}: {} opened, {} closed, net {}",
            interval.from_year,
            interval.to_year,
            with_commas(interval.opened),
            with_commas(interval.closed),
            interval.display_delta()
        );

        let leaders: Vec<String> = [(Direction::Closed, "closures"), (Direction::Opened, "openings")]
            .into_iter()
            .filter_map(|(direction, label)| {
                let leader = interval
                    .geography
                    .top_groups(direction, GeoDimension::State)
                    .iter()
                    .find(|g| g.group != UNKNOWN_GROUP)?;
                Some(format!(
                    "{label} led by {} ({})",
                    display_state(&leader.group),
                    with_commas(leader.count)
                ))
            })
            .collect();
        if !leaders.is_empty() {
            note.push_str("; ");
            note.push_str(&leaders.join(", "));
        }
        note.push('.');

        if interval.unresolved_count > 0 {
            note.push_str(&format!(
                " {} records could not be located and were excluded.",
                with_commas(interval.unresolved_count)
            ));
        }
        note
    }
}

/// Synthesize with default thresholds.
pub fn synthesize(
    sizes: &[(Year, usize)],
    geography: &GeographicBreakdown,
    compared_intervals: usize,
) -> String {
    NarrativeSynthesizer::default().synthesize(sizes, geography, compared_intervals)
}

/// "A", "A and B", "A, B, and C".
pub fn oxford_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

fn format_pace(pace: f64) -> String {
    if pace == 0.0 {
        "0.0".to_string()
    } else {
        format!("{pace:+.1}")
    }
}

/// 1097 -> "1,097".
pub fn with_commas(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn display_state(code: &str) -> &str {
    state_name(code).unwrap_or(code)
}

pub fn state_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "AL" => "Alabama",
        "AK" => "Alaska",
        "AZ" => "Arizona",
        "AR" => "Arkansas",
        "CA" => "California",
        "CO" => "Colorado",
        "CT" => "Connecticut",
        "DE" => "Delaware",
        "DC" => "the District of Columbia",
        "FL" => "Florida",
        "GA" => "Georgia",
        "HI" => "Hawaii",
        "ID" => "Idaho",
        "IL" => "Illinois",
        "IN" => "Indiana",
        "IA" => "Iowa",
        "KS" => "Kansas",
        "KY" => "Kentucky",
        "LA" => "Louisiana",
        "ME" => "Maine",
        "MD" => "Maryland",
        "MA" => "Massachusetts",
        "MI" => "Michigan",
        "MN" => "Minnesota",
        "MS" => "Mississippi",
        "MO" => "Missouri",
        "MT" => "Montana",
        "NE" => "Nebraska",
        "NV" => "Nevada",
        "NH" => "New Hampshire",
        "NJ" => "New Jersey",
        "NM" => "New Mexico",
        "NY" => "New York",
        "NC" => "North Carolina",
        "ND" => "North Dakota",
        "OH" => "Ohio",
        "OK" => "Oklahoma",
        "OR" => "Oregon",
        "PA" => "Pennsylvania",
        "RI" => "Rhode Island",
        "SC" => "South Carolina",
        "SD" => "South Dakota",
        "TN" => "Tennessee",
        "TX" => "Texas",
        "UT" => "Utah",
        "VT" => "Vermont",
        "VA" => "Virginia",
        "WA" => "Washington",
        "WV" => "West Virginia",
        "WI" => "Wisconsin",
        "WY" => "Wyoming",
        "PR" => "Puerto Rico",
        "GU" => "Guam",
        "VI" => "the U.S. Virgin Islands",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_aggregator::GeographicAggregate;

    fn breakdown(opened: &[(&str, usize)], closed: &[(&str, usize)]) -> GeographicBreakdown {
        let agg = |direction, groups: &[(&str, usize)]| GeographicAggregate {
            dimension: GeoDimension::State,
            direction,
            total: groups.iter().map(|(_, c)| c).sum(),
            group_count: groups.len(),
            top: groups
                .iter()
                .map(|(g, c)| GroupCount { group: g.to_string(), count: *c })
                .collect(),
        };
        GeographicBreakdown {
            aggregates: vec![agg(Direction::Opened, opened), agg(Direction::Closed, closed)],
        }
    }

    #[test]
    fn oxford_join_shapes() {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        assert_eq!(oxford_join(&s(&[])), "");
        assert_eq!(oxford_join(&s(&["Ohio"])), "Ohio");
        assert_eq!(oxford_join(&s(&["Ohio", "Texas"])), "Ohio and Texas");
        assert_eq!(oxford_join(&s(&["Ohio", "Texas", "Utah"])), "Ohio, Texas, and Utah");
    }

    #[test]
    fn stable_band_is_inclusive() {
        let synth = NarrativeSynthesizer::default();
        assert_eq!(synth.trend(1000, 1020), Trend::Stable);
        assert_eq!(synth.trend(1000, 980), Trend::Stable);
        assert_eq!(synth.trend(1000, 1021), Trend::Growing);
        assert_eq!(synth.trend(1000, 979), Trend::Shrinking);
        assert_eq!(synth.trend(0, 5), Trend::Growing);
    }

    #[test]
    fn stable_band_uses_unrounded_change() {
        let synth = NarrativeSynthesizer::default();
        // +2.04% and -2.04% both display as 2.0% but sit outside the band.
        assert_eq!(synth.trend(10_000, 10_204), Trend::Growing);
        assert_eq!(synth.trend(10_000, 9_796), Trend::Shrinking);
        assert_eq!(synth.trend(10_000, 10_200), Trend::Stable);
        assert_eq!(synth.trend(10_000, 9_800), Trend::Stable);

        let text = synthesize(&[(2021, 10_000), (2024, 10_204)], &breakdown(&[("TX", 204)], &[]), 3);
        assert!(text.starts_with("The branch network grew from 10,000 branches in 2021 to 10,204 in 2024 (+2.0%)"), "{text}");
    }

    #[test]
    fn uncompared_run_does_not_claim_zero_churn() {
        let text = synthesize(&[(2021, 10), (2023, 4)], &GeographicBreakdown::default(), 0);
        assert!(text.contains("could not be determined"), "{text}");
        assert!(!text.contains("No branch openings"), "{text}");
        assert!(!text.contains("No branch closures"), "{text}");
    }

    #[test]
    fn stable_run_narrative() {
        let sizes = [(2021, 1110), (2022, 1090), (2023, 1082), (2024, 1078), (2025, 1097)];
        let text = synthesize(&sizes, &breakdown(&[("TX", 12), ("FL", 8)], &[("OH", 9), ("MI", 7), ("IN", 3)]), 4);
        assert!(text.starts_with(
            "The branch network remained relatively stable, moving from 1,110 branches in 2021 to 1,097 in 2025 (-1.2%), an average net change of -3.3 branches per year."
        ), "{text}");
        assert!(text.contains("Openings totaled 20, concentrated in Texas (12) and Florida (8)."));
        assert!(text.contains("Closures totaled 19, concentrated in Ohio (9), Michigan (7), and Indiana (3)."));
    }

    #[test]
    fn growth_and_empty_directions() {
        let text = synthesize(&[(2020, 100), (2022, 120)], &breakdown(&[("CA", 20)], &[]), 1);
        assert!(text.starts_with("The branch network grew from 100 branches in 2020 to 120 in 2022 (+20.0%), adding an average of 10.0 branches per year."));
        assert!(text.ends_with("No branch closures were recorded over the period."));
    }

    #[test]
    fn unknown_group_is_never_named_and_top_n_applies() {
        let synth = NarrativeSynthesizer::new(2.0, 2);
        let text = synth.synthesize(
            &[(2020, 100), (2021, 50)],
            &breakdown(&[], &[("Unknown", 30), ("OH", 10), ("PA", 5), ("WV", 5)]),
            1,
        );
        assert!(text.contains("The branch network contracted"));
        assert!(text.contains("Closures totaled 50, concentrated in Ohio (10) and Pennsylvania (5)."));
        assert!(!text.contains("Unknown"));
    }

    #[test]
    fn single_and_empty_runs() {
        let empty = GeographicBreakdown::default();
        assert_eq!(synthesize(&[(2024, 1234)], &empty, 0), "The branch network comprised 1,234 branches in 2024.");
        assert_eq!(synthesize(&[], &empty, 0), "No branch data was available for the requested period.");
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(with_commas(0), "0");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
        assert_eq!(with_commas(1_234_567), "1,234,567");
    }
}
