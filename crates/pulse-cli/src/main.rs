//! Pulse CLI - operate the precomputation engine over a local store.
//!
//! This is the entry point for the `pulse` binary.

mod input;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use pulse_core::{Dimension, Facet, Granularity};
use pulse_engine::{
    DiscoveryScope, EngineConfig, Precompute, PrecomputeService, RecordFilter, RunStatus,
    TimeWindow,
};
use pulse_store::{RecordStore, RocksStore};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often `precompute` reports progress while a run is in flight.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Records written per batch by `load`.
const LOAD_BATCH: usize = 1000;

/// Pulse CLI - precompute and inspect collection aggregates.
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of the local store.
    #[arg(long, env = "PULSE_DATA_DIR", default_value = "./pulse-data")]
    data_dir: PathBuf,

    /// Where facet-value discovery looks.
    #[arg(long, env = "PULSE_DISCOVERY_SCOPE", value_enum, default_value_t = ScopeArg::Global)]
    discovery_scope: ScopeArg,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load records from a JSON Lines file.
    Load {
        /// Input file, one record per line.
        path: PathBuf,
    },

    /// Precompute every aggregate set of a collection.
    Precompute {
        /// Collection code.
        code: String,
    },

    /// Print the stored rows of one dimension.
    Aggregates {
        /// Collection code.
        code: String,
        /// One of day, hour, minute, label, sentiment, damage, image_relevancy.
        dimension: Dimension,
    },

    /// Print every aggregate set of a collection.
    Overview {
        /// Collection code.
        code: String,
    },

    /// Print the records behind one bucket.
    Records {
        /// Collection code.
        code: String,
        /// Bucket width.
        #[arg(long)]
        granularity: Granularity,
        /// Any instant inside the bucket (RFC 3339).
        #[arg(long)]
        bucket: DateTime<Utc>,
        /// Facet to filter on.
        #[arg(long, requires = "value")]
        facet: Option<Facet>,
        /// Required facet value.
        #[arg(long, requires = "facet")]
        value: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScopeArg {
    Global,
    Collection,
}

impl From<ScopeArg> for DiscoveryScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Global => Self::Global,
            ScopeArg::Collection => Self::Collection,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.debug { "info,pulse=debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = Arc::new(
        RocksStore::open(&args.data_dir)
            .with_context(|| format!("failed to open store at {}", args.data_dir.display()))?,
    );
    let config = EngineConfig {
        discovery_scope: args.discovery_scope.into(),
        ..EngineConfig::default()
    };

    let engine = PrecomputeService::new(Arc::clone(&store), config);

    match args.command {
        Command::Load { path } => load(store.as_ref(), &path),
        Command::Precompute { code } => precompute(&engine, &code).await,
        Command::Aggregates { code, dimension } => {
            print_json(&engine.get_aggregates(&code, dimension).await?)
        }
        Command::Overview { code } => print_json(&engine.get_overview(&code).await?),
        Command::Records {
            code,
            granularity,
            bucket,
            facet,
            value,
        } => {
            let filter = match (facet, value) {
                (Some(facet), Some(value)) => RecordFilter::Facet { facet, value },
                _ => RecordFilter::Frequency,
            };
            let window = TimeWindow::new(granularity, bucket);
            print_json(&engine.get_raw_records(&code, &filter, window).await?)
        }
    }
}

/// Seed the store from a JSON Lines file.
fn load(store: &impl RecordStore, path: &Path) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let records = input::read_records(BufReader::new(file))?;

    for chunk in records.chunks(LOAD_BATCH) {
        store.put_records(chunk)?;
    }

    tracing::info!(count = records.len(), path = %path.display(), "Loaded records");
    Ok(())
}

/// Start a run and report progress until it finishes.
async fn precompute(engine: &impl Precompute, code: &str) -> anyhow::Result<()> {
    let handle = engine.start_precomputation(code).await?;
    eprintln!(
        "run {} started for {} ({} to {}, {} days)",
        handle.run_id, handle.code, handle.bounds.min, handle.bounds.max, handle.bounds.span_days
    );

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let wait = engine.wait_for_run(&handle.run_id);
    tokio::pin!(wait);

    let status = loop {
        tokio::select! {
            status = &mut wait => break status?,
            _ = ticker.tick() => {
                eprintln!("progress: {:.1}%", engine.get_progress().await);
            }
        }
    };

    let snapshot = engine.get_run_progress(&handle.run_id).await?;
    print_json(&snapshot)?;

    match status {
        RunStatus::Failed { failed } => {
            let names: Vec<_> = failed.iter().map(|d| d.as_str()).collect();
            anyhow::bail!("precomputation failed for: {}", names.join(", "))
        }
        RunStatus::Rejected { reason } => anyhow::bail!("precomputation rejected: {reason}"),
        RunStatus::Running | RunStatus::Completed => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_records_command() {
        let args = Args::try_parse_from([
            "pulse",
            "--data-dir",
            "/tmp/pulse",
            "records",
            "C1",
            "--granularity",
            "hour",
            "--bucket",
            "2021-01-01T10:30:00Z",
            "--facet",
            "sentiment",
            "--value",
            "positive",
        ])
        .unwrap();

        match args.command {
            Command::Records {
                granularity, facet, ..
            } => {
                assert_eq!(granularity, Granularity::Hour);
                assert_eq!(facet, Some(Facet::Sentiment));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn facet_requires_value() {
        let result = Args::try_parse_from([
            "pulse",
            "records",
            "C1",
            "--granularity",
            "hour",
            "--bucket",
            "2021-01-01T10:30:00Z",
            "--facet",
            "sentiment",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn load_then_precompute() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","text":"a","sentiment":"positive"}"#,
        )
        .unwrap();

        let store = Arc::new(RocksStore::open(dir.path().join("db")).unwrap());
        load(store.as_ref(), &path).unwrap();

        let engine = PrecomputeService::with_defaults(store);
        precompute(&engine, "C1").await.unwrap();
        assert!(precompute(&engine, "").await.is_err());
    }
}
