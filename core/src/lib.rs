//! Branch network temporal reconciliation.
//!
//! Reconciles yearly snapshots of an institution's branch locations and
//! reports which branches opened, which closed, and where those changes
//! concentrated.
//!
//! Pipeline: SnapshotLoader → KeyNormalizer → diff → GeoAggregator →
//! NarrativeSynthesizer, sequenced by `engine::NetworkAnalyzer`.

pub mod config;
pub mod diff_engine;
pub mod engine;
pub mod error;
pub mod geo_aggregator;
pub mod key;
pub mod loader;
pub mod narrative;
pub mod record;
pub mod report;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod synthetic;
pub mod types;

pub use config::AnalysisConfig;
pub use engine::{CancelFlag, NetworkAnalyzer};
pub use error::{NetResult, NetworkError};
pub use record::BranchRecord;
pub use report::NetworkAnalysisReport;
