//! Command surface for the `cxr` binary.
//!
//! One `cxr run` is a single batch: the catalog picks the races held on or
//! before the as-of date, the gap file supplies timing data, every race is
//! rated, the ratings are merged into the persisted dataset, and the result is
//! saved in one atomic write. Runs against the same dataset must not overlap.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use cx_ratings_core::{
    format_iso_date, merge_with_summary, parse_gap, parse_iso_date, rate_with_policy,
    score_targets, today_utc, GapFile, MergeSummary, RaceCatalog, RaceOutcome, RaceStatus,
    RatingPolicy,
};
use cx_ratings_store_json::JsonDatasetStore;
use serde::Serialize;
use time::Date;
use tracing_subscriber::EnvFilter;

const DEFAULT_CATALOG: &str = include_str!("../catalog/races.v1.json");
const DEFAULT_LOG_FILTER: &str = "cx_ratings_core=info,cx_ratings_store_json=info,cx_ratings_cli=info";

#[derive(Debug, Parser)]
#[command(name = "cxr")]
#[command(about = "Spoiler-free excitement ratings for cyclocross races")]
pub struct Cli {
    #[arg(long, default_value = "./races.json")]
    dataset: PathBuf,

    /// Race registry (JSON array); defaults to the built-in catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Rating policy (JSON); defaults to policy v1.
    #[arg(long)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rate one gap list and print the result.
    Rate(RateArgs),
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Rate all due races and merge them into the dataset.
    Run(RunArgs),
    Dataset {
        #[command(subcommand)]
        command: DatasetCommand,
    },
}

#[derive(Debug, Args)]
pub struct RateArgs {
    /// Gap to the winner, in seconds or as `m:ss` / `s.t.`; repeat per finisher.
    #[arg(long = "gap")]
    gaps: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    List(CatalogListArgs),
}

#[derive(Debug, Args)]
pub struct CatalogListArgs {
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Gap file written by the result extractor.
    #[arg(long)]
    gaps: PathBuf,
    #[arg(long)]
    as_of: Option<String>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum DatasetCommand {
    Show,
    Check,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub as_of: String,
    pub policy_version: u32,
    pub dry_run: bool,
    pub targets: usize,
    pub rated: usize,
    pub missing: usize,
    pub rejected: usize,
    pub merge: MergeSummary,
    pub dataset_entries: usize,
    pub races: Vec<RaceOutcome>,
}

#[derive(Debug, Clone, Serialize)]
struct DatasetCheck {
    path: String,
    healthy: bool,
    entries: usize,
    manual: usize,
    provisional: usize,
    no_data: usize,
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the default filter.
///
/// Call once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Executes the parsed command.
///
/// # Errors
/// Returns an error when configuration cannot be loaded, the dataset is
/// unreadable or corrupt, or saving fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Rate(args) => {
            let policy = load_policy(cli.policy.as_deref())?;
            let gaps = args
                .gaps
                .iter()
                .map(String::as_str)
                .map(parse_gap)
                .collect::<Result<Vec<_>, _>>()?;
            let rating = rate_with_policy(&gaps, &policy)?;
            println!("{}", serde_json::to_string_pretty(&rating)?);
            Ok(())
        }
        Command::Catalog { command } => match command {
            CatalogCommand::List(args) => {
                let catalog = load_catalog(cli.catalog.as_deref())?;
                let as_of = parse_as_of(args.as_of.as_deref())?;
                let targets = catalog.list_targets(as_of);
                println!("{}", serde_json::to_string_pretty(&targets)?);
                Ok(())
            }
        },
        Command::Run(args) => {
            let catalog = load_catalog(cli.catalog.as_deref())?;
            let policy = load_policy(cli.policy.as_deref())?;
            let store = JsonDatasetStore::open(&cli.dataset);
            let report = run_batch(&catalog, &policy, &store, &args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Dataset { command } => {
            let store = JsonDatasetStore::open(&cli.dataset);
            run_dataset(&command, &store)
        }
    }
}

/// Scores every due race and merges the ratings into the store.
///
/// The dataset is loaded before any rating happens and saved only once the
/// merge is complete, so a failed run leaves the stored document untouched.
///
/// # Errors
/// Returns an error when the gap file or dataset cannot be read or the
/// merged dataset cannot be saved.
pub fn run_batch(
    catalog: &RaceCatalog,
    policy: &RatingPolicy,
    store: &JsonDatasetStore,
    args: &RunArgs,
) -> Result<RunReport> {
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let gap_file = load_gap_file(&args.gaps)?;
    let existing = store
        .load_or_empty()
        .context("refusing to run against an unreadable dataset")?;

    let targets = catalog.list_targets(as_of);
    let skipped = catalog.races().len() - targets.len();
    if skipped > 0 {
        tracing::info!(skipped, "skipping races after the as-of date");
    }

    let batch = score_targets(&targets, &gap_file, policy);
    let (merged, summary) = merge_with_summary(&existing, &batch.incoming);

    if args.dry_run {
        tracing::info!("dry run; dataset not saved");
    } else {
        store
            .save(&merged)
            .with_context(|| format!("failed saving dataset to {}", store.path().display()))?;
    }

    let report = RunReport {
        as_of: format_iso_date(as_of)?,
        policy_version: policy.policy_version,
        dry_run: args.dry_run,
        targets: targets.len(),
        rated: batch.count(|status| matches!(status, RaceStatus::Rated { .. })),
        missing: batch.count(|status| matches!(status, RaceStatus::Missing)),
        rejected: batch.count(|status| matches!(status, RaceStatus::Rejected { .. })),
        merge: summary,
        dataset_entries: merged.len(),
        races: batch.outcomes,
    };

    tracing::info!(
        targets = report.targets,
        rated = report.rated,
        missing = report.missing,
        rejected = report.rejected,
        inserted = summary.inserted,
        updated = summary.updated,
        manual_preserved = summary.manual_preserved,
        "run complete"
    );
    Ok(report)
}

fn run_dataset(command: &DatasetCommand, store: &JsonDatasetStore) -> Result<()> {
    match command {
        DatasetCommand::Show => {
            let document = store
                .load_document()
                .with_context(|| format!("failed loading {}", store.path().display()))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        DatasetCommand::Check => {
            let dataset = store
                .load()
                .map_err(|err| anyhow!("dataset check failed: {err}"))?;
            let check = DatasetCheck {
                path: store.path().display().to_string(),
                healthy: true,
                entries: dataset.len(),
                manual: dataset.entries().filter(|entry| entry.is_manual).count(),
                provisional: dataset.entries().filter(|entry| entry.provisional).count(),
                no_data: dataset.entries().filter(|entry| entry.stars == 0).count(),
            };
            println!("{}", serde_json::to_string_pretty(&check)?);
            Ok(())
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<RaceCatalog> {
    let Some(path) = path else {
        return RaceCatalog::from_json_str(DEFAULT_CATALOG)
            .map_err(|err| anyhow!("built-in catalog is invalid: {err}"));
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading catalog {}", path.display()))?;
    let catalog = RaceCatalog::from_json_str(&raw)
        .with_context(|| format!("invalid catalog {}", path.display()))?;
    tracing::debug!(path = %path.display(), races = catalog.races().len(), "loaded catalog");
    Ok(catalog)
}

fn load_policy(path: Option<&Path>) -> Result<RatingPolicy> {
    let Some(path) = path else {
        return Ok(RatingPolicy::v1());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading policy {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("policy {} is not JSON", path.display()))?;
    RatingPolicy::from_json(&value).with_context(|| format!("invalid policy {}", path.display()))
}

fn load_gap_file(path: &Path) -> Result<GapFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading gap file {}", path.display()))?;
    GapFile::from_json_str(&raw).with_context(|| format!("invalid gap file {}", path.display()))
}

fn parse_as_of(raw: Option<&str>) -> Result<Date> {
    match raw {
        Some(value) => {
            parse_iso_date(value).map_err(|err| anyhow!("invalid --as-of value: {err}"))
        }
        None => Ok(today_utc()),
    }
}
