use crate::{geo_aggregator::DEFAULT_TOP_N, key::DEFAULT_COORDINATE_PRECISION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trend band: first-to-last change within ±this percentage is "stable".
pub const DEFAULT_STABLE_BAND_PCT: f64 = 2.0;

/// Groups named per direction in the narrative.
pub const DEFAULT_NARRATIVE_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Entries kept per ranked geographic list.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_narrative_top_n")]
    pub narrative_top_n: usize,
    #[serde(default = "default_stable_band_pct")]
    pub stable_band_pct: f64,
    /// Decimal places kept in coordinate keys. Lower it to widen the
    /// matching tolerance when geocodes drift between vintages.
    #[serde(default = "default_coordinate_precision")]
    pub coordinate_precision: u32,
    /// "STATE|County" -> metro area name, consulted when a record carries
    /// no metro area of its own.
    #[serde(default)]
    pub metro_lookup: BTreeMap<String, String>,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_narrative_top_n() -> usize {
    DEFAULT_NARRATIVE_TOP_N
}

fn default_stable_band_pct() -> f64 {
    DEFAULT_STABLE_BAND_PCT
}

fn default_coordinate_precision() -> u32 {
    DEFAULT_COORDINATE_PRECISION
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n:                DEFAULT_TOP_N,
            narrative_top_n:      DEFAULT_NARRATIVE_TOP_N,
            stable_band_pct:      DEFAULT_STABLE_BAND_PCT,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
            metro_lookup:         BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.top_n == 0 {
            anyhow::bail!("top_n must be at least 1");
        }
        if self.narrative_top_n == 0 {
            anyhow::bail!("narrative_top_n must be at least 1");
        }
        if !self.stable_band_pct.is_finite() || self.stable_band_pct < 0.0 {
            anyhow::bail!("stable_band_pct must be a non-negative number");
        }
        if self.coordinate_precision > 9 {
            anyhow::bail!("coordinate_precision must be between 0 and 9");
        }
        for key in self.metro_lookup.keys() {
            if !key.contains('|') {
                anyhow::bail!("metro_lookup key '{key}' must look like \"STATE|County\"");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config: AnalysisConfig = serde_json::from_str(r#"{ "top_n": 3 }"#).unwrap();
        assert_eq!(config.top_n, 3);
        assert_eq!(config.narrative_top_n, DEFAULT_NARRATIVE_TOP_N);
        assert_eq!(config.coordinate_precision, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_narrative_top_n() {
        let config: AnalysisConfig = serde_json::from_str(r#"{ "narrative_top_n": 0 }"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("narrative_top_n"));
    }

    #[test]
    fn rejects_malformed_metro_keys() {
        let mut config = AnalysisConfig::default();
        config.metro_lookup.insert("Cook".into(), "Chicago".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AnalysisConfig::load("/nonexistent/branchnet.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }
}
