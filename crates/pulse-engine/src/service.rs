//! Precomputation service implementation.
//!
//! This module provides the `Precompute` trait and `PrecomputeService`
//! implementation that ties run orchestration, progress tracking, and the read
//! path together.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_core::{Dimension, Facet, Granularity, RunId};
use pulse_store::{FacetAggregate, Store, TimeBucketAggregate};

use crate::error::{EngineError, Result};
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressTracker;
use crate::query::{parse_code, QueryService};
use crate::types::{
    Aggregates, CollectionOverview, EngineConfig, ProgressSnapshot, RawRecordsView,
    RecordFilter, RunHandle, RunStatus, TimeWindow,
};

/// Trait defining the caller-facing engine operations.
///
/// Every collection code is taken as supplied by the caller and validated here.
#[async_trait]
pub trait Precompute: Send + Sync {
    // =========================================================================
    // Runs
    // =========================================================================

    /// Start a precomputation run for a collection.
    ///
    /// Returns once the seven aggregation jobs are launched.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MissingCollectionCode` if `code` is empty, or
    /// `EngineError::UnknownCollection` if no record carries it.
    async fn start_precomputation(&self, code: &str) -> Result<RunHandle>;

    /// Percent complete of the most recently started run, 0 if none.
    async fn get_progress(&self) -> f64;

    /// Snapshot of one run's progress.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RunNotFound` if the run is unknown or evicted.
    async fn get_run_progress(&self, run_id: &RunId) -> Result<ProgressSnapshot>;

    /// Wait for a run to finish and return its final status.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RunNotFound` if the run is unknown or evicted.
    async fn wait_for_run(&self, run_id: &RunId) -> Result<RunStatus>;

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Time-bucket rows of one granularity, ascending by bucket.
    async fn get_time_bucket_aggregates(
        &self,
        code: &str,
        granularity: Granularity,
    ) -> Result<Vec<TimeBucketAggregate>>;

    /// Rows of one facet, ascending by bucket and then value.
    async fn get_facet_aggregates(&self, code: &str, facet: Facet) -> Result<Vec<FacetAggregate>>;

    /// Rows of any dimension.
    async fn get_aggregates(&self, code: &str, dimension: Dimension) -> Result<Aggregates>;

    /// All seven aggregate sets of a collection.
    async fn get_overview(&self, code: &str) -> Result<CollectionOverview>;

    /// Texts and images behind one bucket.
    async fn get_raw_records(
        &self,
        code: &str,
        filter: &RecordFilter,
        window: TimeWindow,
    ) -> Result<RawRecordsView>;
}

/// The main precomputation service implementation.
pub struct PrecomputeService<S: Store> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    tracker: Arc<ProgressTracker>,
    orchestrator: Orchestrator<S>,
    query: QueryService<S>,
}

impl<S: Store + 'static> PrecomputeService<S> {
    /// Create a new precomputation service.
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let tracker = Arc::new(ProgressTracker::new(config.retained_runs));
        let orchestrator =
            Orchestrator::new(Arc::clone(&store), Arc::clone(&config), Arc::clone(&tracker));
        let query = QueryService::new(Arc::clone(&store));

        Self {
            store,
            config,
            tracker,
            orchestrator,
            query,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, EngineConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the progress registry.
    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }
}

#[async_trait]
impl<S: Store + 'static> Precompute for PrecomputeService<S> {
    async fn start_precomputation(&self, code: &str) -> Result<RunHandle> {
        self.orchestrator.start(code)
    }

    async fn get_progress(&self) -> f64 {
        self.tracker.percent_complete()
    }

    async fn get_run_progress(&self, run_id: &RunId) -> Result<ProgressSnapshot> {
        self.tracker
            .get(run_id)
            .map(|run| run.snapshot())
            .ok_or(EngineError::RunNotFound(*run_id))
    }

    async fn wait_for_run(&self, run_id: &RunId) -> Result<RunStatus> {
        let run = self
            .tracker
            .get(run_id)
            .ok_or(EngineError::RunNotFound(*run_id))?;
        Ok(run.wait().await)
    }

    async fn get_time_bucket_aggregates(
        &self,
        code: &str,
        granularity: Granularity,
    ) -> Result<Vec<TimeBucketAggregate>> {
        let code = parse_code(code)?;
        self.query.time_buckets(&code, granularity)
    }

    async fn get_facet_aggregates(&self, code: &str, facet: Facet) -> Result<Vec<FacetAggregate>> {
        let code = parse_code(code)?;
        self.query.facets(&code, facet)
    }

    async fn get_aggregates(&self, code: &str, dimension: Dimension) -> Result<Aggregates> {
        let code = parse_code(code)?;
        self.query.aggregates(&code, dimension)
    }

    async fn get_overview(&self, code: &str) -> Result<CollectionOverview> {
        let code = parse_code(code)?;
        self.query.overview(&code)
    }

    async fn get_raw_records(
        &self,
        code: &str,
        filter: &RecordFilter,
        window: TimeWindow,
    ) -> Result<RawRecordsView> {
        let code = parse_code(code)?;
        self.query.raw_records(&code, filter, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_core::CollectionCode;
    use pulse_store::{RawRecord, RecordStore, RocksStore};
    use tempfile::TempDir;

    fn create_test_service() -> (PrecomputeService<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let service = PrecomputeService::with_defaults(store);
        (service, dir)
    }

    fn seed(service: &PrecomputeService<RocksStore>) {
        let code = CollectionCode::new("C1").unwrap();
        service
            .store()
            .put_records(&[
                RawRecord::new(code.clone(), Utc.with_ymd_and_hms(2021, 1, 1, 10, 5, 0).unwrap(), "a")
                    .with_facet(Facet::Label, "caution"),
                RawRecord::new(code, Utc.with_ymd_and_hms(2021, 1, 1, 10, 40, 0).unwrap(), "b")
                    .with_facet(Facet::Label, "caution"),
            ])
            .unwrap();
    }

    #[tokio::test]
    async fn progress_is_zero_before_any_run() {
        let (service, _dir) = create_test_service();
        assert!((service.get_progress().await - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn run_reaches_full_progress() {
        let (service, _dir) = create_test_service();
        seed(&service);

        let handle = service.start_precomputation("C1").await.unwrap();
        assert_eq!(handle.bounds.span_days, 0);

        let status = service.wait_for_run(&handle.run_id).await.unwrap();
        assert_eq!(status, RunStatus::Completed);
        assert!((service.get_progress().await - 100.0).abs() < 1e-9);

        let snapshot = service.get_run_progress(&handle.run_id).await.unwrap();
        assert_eq!(snapshot.done.len(), Dimension::COUNT);
        assert_eq!(snapshot.bounds, Some(handle.bounds));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (service, _dir) = create_test_service();
        let run_id = RunId::generate();

        assert!(matches!(
            service.get_run_progress(&run_id).await,
            Err(EngineError::RunNotFound(id)) if id == run_id
        ));
        assert!(matches!(
            service.wait_for_run(&run_id).await,
            Err(EngineError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn reads_validate_code() {
        let (service, _dir) = create_test_service();
        assert!(matches!(
            service.get_overview("").await,
            Err(EngineError::MissingCollectionCode)
        ));
        assert!(service
            .get_aggregates("C1", Dimension::Day)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn label_rows_after_run() {
        let (service, _dir) = create_test_service();
        seed(&service);

        let handle = service.start_precomputation("C1").await.unwrap();
        service.wait_for_run(&handle.run_id).await.unwrap();

        let rows = service.get_facet_aggregates("C1", Facet::Label).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.value == "caution" && r.count == 1));
    }
}
