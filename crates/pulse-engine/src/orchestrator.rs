//! Precomputation run orchestration.
//!
//! Starting a run validates the collection code, resets progress, resolves the
//! collection bounds, and then launches the seven aggregation jobs as blocking
//! tasks in one [`JoinSet`]. A supervisor task drains the set and publishes the
//! run's final [`RunStatus`]. The caller gets a [`RunHandle`] back as soon as
//! the jobs are launched.

use std::sync::Arc;
use std::time::Instant;

use pulse_core::{CollectionCode, Dimension};
use pulse_store::Store;
use tokio::task::JoinSet;

use crate::bounds::{CollectionBounds, CollectionBoundsResolver};
use crate::error::{EngineError, Result};
use crate::facet::FacetAggregator;
use crate::progress::{ProgressTracker, RunProgress};
use crate::query::parse_code;
use crate::time_bucket::TimeBucketAggregator;
use crate::types::{EngineConfig, RunHandle, RunStatus};

type JobOutcome = (Dimension, Result<usize>);

/// Launches precomputation runs.
pub struct Orchestrator<S: Store> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    tracker: Arc<ProgressTracker>,
}

impl<S: Store + 'static> Orchestrator<S> {
    /// Create an orchestrator reporting into `tracker`.
    #[must_use]
    pub const fn new(store: Arc<S>, config: Arc<EngineConfig>, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            store,
            config,
            tracker,
        }
    }

    /// Start a run for `code`.
    ///
    /// Must be called from within a Tokio runtime. Returns once all seven jobs
    /// are launched; it does not wait for them.
    ///
    /// # Errors
    ///
    /// - `EngineError::MissingCollectionCode` if `code` is empty, or
    ///   `EngineError::InvalidArgument` if it is too long to be stored. Progress
    ///   is left untouched.
    /// - `EngineError::UnknownCollection` if no record carries the code. Progress
    ///   has already been reset and the run is recorded as rejected.
    /// - `EngineError::StoreUnavailable` if bounds resolution fails.
    pub fn start(&self, code: &str) -> Result<RunHandle> {
        let code = parse_code(code)?;

        let run = self.tracker.reset(code.clone());

        let resolver = CollectionBoundsResolver::new(Arc::clone(&self.store));
        let bounds = match resolver.resolve(&code) {
            Ok(bounds) => bounds,
            Err(e) => {
                tracing::warn!(run_id = %run.run_id(), code = %code, error = %e, "Run rejected");
                run.finish(RunStatus::Rejected {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        run.set_bounds(bounds.clone());

        tracing::info!(
            run_id = %run.run_id(),
            code = %code,
            min = %bounds.min,
            max = %bounds.max,
            span_days = bounds.span_days,
            "Starting precomputation"
        );

        let mut jobs = JoinSet::new();
        for dimension in Dimension::ALL {
            let store = Arc::clone(&self.store);
            let config = Arc::clone(&self.config);
            let run = Arc::clone(&run);
            let code = code.clone();
            let bounds = bounds.clone();

            jobs.spawn_blocking(move || {
                let outcome = run_job(&store, &config, dimension, &code, &bounds, &run);
                (dimension, outcome)
            });
        }

        tokio::spawn(supervise(jobs, Arc::clone(&run)));

        Ok(RunHandle {
            run_id: run.run_id(),
            code,
            bounds,
        })
    }
}

/// Run the job of one dimension to completion.
fn run_job<S: Store>(
    store: &Arc<S>,
    config: &EngineConfig,
    dimension: Dimension,
    code: &CollectionCode,
    bounds: &CollectionBounds,
    progress: &RunProgress,
) -> Result<usize> {
    let started = Instant::now();

    let rows = if let Some(granularity) = dimension.granularity() {
        TimeBucketAggregator::new(Arc::clone(store)).run(code, granularity, bounds, progress)?
    } else if let Some(facet) = dimension.facet() {
        FacetAggregator::new(
            Arc::clone(store),
            config.discovery_scope,
            config.relevancy_values.clone(),
        )
        .run(code, facet, bounds, progress)?
    } else {
        return Err(EngineError::Internal(format!(
            "dimension {dimension} has no job"
        )));
    };

    tracing::debug!(
        run_id = %progress.run_id(),
        dimension = %dimension,
        elapsed = ?started.elapsed(),
        "Job finished"
    );

    Ok(rows)
}

/// Drain a run's jobs and publish its final status.
async fn supervise(mut jobs: JoinSet<JobOutcome>, run: Arc<RunProgress>) {
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok((_, Ok(_))) => {}
            Ok((dimension, Err(e))) => {
                tracing::error!(
                    run_id = %run.run_id(),
                    dimension = %dimension,
                    error = %e,
                    "Aggregation job failed"
                );
            }
            Err(e) => {
                tracing::error!(run_id = %run.run_id(), error = %e, "Aggregation job panicked");
            }
        }
    }

    let failed = run.pending();
    let status = if failed.is_empty() {
        tracing::info!(run_id = %run.run_id(), code = %run.code(), "Precomputation complete");
        RunStatus::Completed
    } else {
        tracing::warn!(
            run_id = %run.run_id(),
            code = %run.code(),
            failed = failed.len(),
            "Precomputation finished with failures"
        );
        RunStatus::Failed { failed }
    };

    run.finish(status);
}
