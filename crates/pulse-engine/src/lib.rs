//! Precomputation and aggregation engine for pulse.
//!
//! This crate turns a collection's raw records into seven precomputed aggregate
//! sets (day, hour, and minute counts plus per-minute counts for four facets)
//! and serves them back, together with drill-down views of the records behind
//! a bucket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Caller (CLI)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PrecomputeService                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │Orchestrator │ │  Progress   │ │    QueryService     │    │
//! │  │  (JoinSet)  │ │  Tracker    │ │    (read path)      │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      │
//!   ┌──────────────┐  ┌──────────────┐           │
//!   │ TimeBucket × 3│  │  Facet × 4   │           │
//!   └──────────────┘  └──────────────┘           │
//!          │                 │                    │
//!          ▼                 ▼                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              RecordStore + AggregateStore (RocksDB)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pulse_engine::{Precompute, PrecomputeService};
//! use pulse_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/pulse")?);
//! let engine = PrecomputeService::with_defaults(store);
//!
//! let run = engine.start_precomputation("C1").await?;
//! println!("Started run {} ({}%)", run.run_id, engine.get_progress().await);
//!
//! let status = engine.wait_for_run(&run.run_id).await?;
//! println!("Finished: {status:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Runs
//!
//! A run validates the collection code, resets progress, resolves the
//! collection's bounds, and launches all seven jobs at once. Each job sets its
//! own progress flag after its rows are written; a failed job leaves its flag
//! clear and the run ends as [`RunStatus::Failed`] listing it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bounds;
pub mod error;
pub mod facet;
pub mod orchestrator;
pub mod progress;
pub mod query;
pub mod service;
pub mod time_bucket;
pub mod types;

pub use bounds::{CollectionBounds, CollectionBoundsResolver};
pub use error::{EngineError, Result};
pub use facet::FacetAggregator;
pub use orchestrator::Orchestrator;
pub use progress::{ProgressTracker, RunProgress};
pub use query::QueryService;
pub use service::{Precompute, PrecomputeService};
pub use time_bucket::TimeBucketAggregator;
pub use types::{
    Aggregates, CollectionOverview, DiscoveryScope, EngineConfig, ImageEntry, ProgressSnapshot,
    RawRecordsView, RecordFilter, RunHandle, RunStatus, TextEntry, TimeWindow,
};
