//! branchnet-runner: run a branch network analysis from the command line.
//!
//! Usage:
//!   branchnet-runner --db branches.db --institution 628 --years 2021-2025
//!   branchnet-runner --db branches.db --institution-name "First Example Bank" --years 2019,2021,2023 --json
//!   branchnet-runner --synthetic-seed 42 --years 2018-2024
//!   branchnet-runner --synthetic-seed 42 --db demo.db   (seed a database, then analyze it)

use anyhow::{bail, Context, Result};
use branchnet_core::{
    loader::{InstitutionResolver, SnapshotLoader},
    report::{AnalysisIssue, NetworkAnalysisReport},
    store::BranchStore,
    synthetic::{SyntheticConfig, SyntheticNetwork},
    types::Year,
    AnalysisConfig, NetworkAnalyzer,
};
use std::env;

const DEFAULT_YEARS: &str = "2021-2025";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let json_output = args.iter().any(|a| a == "--json");
    let years = parse_years(arg_value(&args, "--years").unwrap_or(DEFAULT_YEARS))?;
    let config = match arg_value(&args, "--config") {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let db = arg_value(&args, "--db");
    let synthetic_seed: Option<u64> = arg_value(&args, "--synthetic-seed")
        .map(|s| s.parse().context("--synthetic-seed must be an integer"))
        .transpose()?;

    let report = match (db, synthetic_seed) {
        (None, None) => bail!("either --db or --synthetic-seed is required"),
        (None, Some(seed)) => {
            let institution_id = arg_value(&args, "--institution")
                .map(str::to_string)
                .unwrap_or_else(|| format!("SYN-{seed}"));
            let network = synthetic_network(&institution_id, &years, seed);
            run(network, config, &institution_id, &years)?
        }
        (Some(path), seed) => {
            let store = BranchStore::open(path)?;
            store.migrate()?;
            if let Some(seed) = seed {
                seed_store(&store, &args, &years, seed)?;
            }
            let institution_id = resolve_institution(&store, &args)?;
            run(store, config, &institution_id, &years)?
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn run<L: SnapshotLoader>(
    loader: L,
    config: AnalysisConfig,
    institution_id: &str,
    years: &[Year],
) -> Result<NetworkAnalysisReport> {
    let analyzer = NetworkAnalyzer::new(loader, config);
    let report = analyzer
        .analyze(institution_id, years)
        .with_context(|| format!("analysis of institution {institution_id} failed"))?;
    Ok(report)
}

fn synthetic_network(institution_id: &str, years: &[Year], seed: u64) -> SyntheticNetwork {
    let first = years.iter().copied().min().unwrap_or(2021);
    let last = years.iter().copied().max().unwrap_or(first);
    let mut config = SyntheticConfig::new(institution_id, first, (last - first + 1) as u32);
    config.colocated_rate = 0.12;
    config.missing_coordinate_rate = 0.03;
    config.unlocatable_rate = 0.005;
    SyntheticNetwork::generate(config, seed)
}

/// Write a synthetic network into the store so the database path can be
/// exercised end to end.
fn seed_store(store: &BranchStore, args: &[String], years: &[Year], seed: u64) -> Result<()> {
    let institution_id = arg_value(args, "--institution")
        .map(str::to_string)
        .unwrap_or_else(|| format!("SYN-{seed}"));
    let network = synthetic_network(&institution_id, years, seed);
    let name = arg_value(args, "--institution-name").unwrap_or("Synthetic Bank");
    store.insert_institution(&institution_id, name)?;
    let mut total = 0;
    for year in network.years() {
        if let Some(records) = network.records(year) {
            total += store.insert_branches(records)?;
        }
    }
    log::info!("Seeded {total} synthetic branch records for {institution_id}");
    Ok(())
}

fn resolve_institution(store: &BranchStore, args: &[String]) -> Result<String> {
    if let Some(id) = arg_value(args, "--institution") {
        return Ok(id.to_string());
    }
    let Some(name) = arg_value(args, "--institution-name") else {
        bail!("--institution or --institution-name is required with --db");
    };
    match store.resolve_institution(name)? {
        Some(id) => Ok(id),
        None => bail!("no institution named '{name}'"),
    }
}

fn print_summary(report: &NetworkAnalysisReport) {
    println!("Branch network analysis: institution {}", report.institution_id);
    println!("  generated: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    println!("  {:<6} {:>8} {:>10} {:>10}", "year", "size", "distinct", "unresolved");
    for y in &report.years {
        println!(
            "  {:<6} {:>8} {:>10} {:>10}",
            y.year, y.network_size, y.distinct_keys, y.unresolved_count
        );
    }
    println!();

    for interval in &report.intervals {
        println!("  {}", interval.note);
    }
    if !report.intervals.is_empty() {
        println!();
    }

    if !report.issues.is_empty() {
        println!("  Issues:");
        for issue in &report.issues {
            println!("    - {}", describe_issue(issue));
        }
        println!();
    }

    println!("{}", report.narrative);
}

fn describe_issue(issue: &AnalysisIssue) -> String {
    match issue {
        AnalysisIssue::MissingSnapshot { year } => format!("no snapshot for {year}"),
        AnalysisIssue::DataGap { from_year, to_year } => {
            format!("data gap: {from_year} to {to_year} not compared")
        }
        AnalysisIssue::UnresolvedBranches { year, count, .. } => {
            format!("{count} unlocatable branch record(s) in {year}")
        }
        AnalysisIssue::LoadFailed { year, message } => format!("loading {year} failed: {message}"),
        AnalysisIssue::ConservationMismatch {
            from_year,
            to_year,
            expected_net_closures,
            observed_net_closures,
            unresolved_count,
        } => format!(
            "{from_year} to {to_year}: net closures {observed_net_closures} vs size change {expected_net_closures} ({unresolved_count} unresolved)"
        ),
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// "2021-2025" or "2019,2021,2023".
fn parse_years(raw: &str) -> Result<Vec<Year>> {
    if let Some((start, end)) = raw.split_once('-') {
        let start: Year = start.trim().parse().context("bad start year")?;
        let end: Year = end.trim().parse().context("bad end year")?;
        if end < start {
            bail!("year range {raw} is reversed");
        }
        return Ok((start..=end).collect());
    }
    raw.split(',')
        .map(|y| y.trim().parse::<Year>().with_context(|| format!("bad year '{y}'")))
        .collect()
}
