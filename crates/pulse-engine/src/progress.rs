//! Per-run progress tracking.
//!
//! Each precomputation run owns a [`RunProgress`]: seven completion flags packed
//! into one atomic byte, the resolved bounds, and a watch channel carrying the
//! overall [`RunStatus`]. The [`ProgressTracker`] keeps recent runs addressable
//! by [`RunId`] and remembers which run was started last.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_core::{CollectionCode, Dimension, RunId};
use tokio::sync::watch;

use crate::bounds::CollectionBounds;
use crate::types::{ProgressSnapshot, RunStatus};

/// Flag mask with every dimension done.
const ALL_DONE: u8 = 0b0111_1111;

/// Progress of a single precomputation run.
pub struct RunProgress {
    run_id: RunId,
    code: CollectionCode,
    started_at: DateTime<Utc>,
    flags: AtomicU8,
    bounds: RwLock<Option<CollectionBounds>>,
    status: watch::Sender<RunStatus>,
}

impl RunProgress {
    /// Create progress for a new run with every flag cleared.
    #[must_use]
    pub fn new(code: CollectionCode) -> Self {
        let (status, _) = watch::channel(RunStatus::Running);
        Self {
            run_id: RunId::generate(),
            code,
            started_at: Utc::now(),
            flags: AtomicU8::new(0),
            bounds: RwLock::new(None),
            status,
        }
    }

    /// The run's ID.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The collection being precomputed.
    #[must_use]
    pub const fn code(&self) -> &CollectionCode {
        &self.code
    }

    /// Set the flag of one dimension. Setting it again has no effect.
    pub fn mark_done(&self, dimension: Dimension) {
        let previous = self.flags.fetch_or(dimension.bit(), Ordering::AcqRel);
        if previous & dimension.bit() == 0 {
            tracing::debug!(run_id = %self.run_id, dimension = %dimension, "Job done");
        }
    }

    /// Check the flag of one dimension.
    #[must_use]
    pub fn is_done(&self, dimension: Dimension) -> bool {
        self.flags.load(Ordering::Acquire) & dimension.bit() != 0
    }

    /// Dimensions whose flag is set, in launch order.
    #[must_use]
    pub fn done(&self) -> Vec<Dimension> {
        let flags = self.flags.load(Ordering::Acquire);
        Dimension::ALL
            .into_iter()
            .filter(|d| flags & d.bit() != 0)
            .collect()
    }

    /// Dimensions whose flag is still clear, in launch order.
    #[must_use]
    pub fn pending(&self) -> Vec<Dimension> {
        let flags = self.flags.load(Ordering::Acquire);
        Dimension::ALL
            .into_iter()
            .filter(|d| flags & d.bit() == 0)
            .collect()
    }

    /// Share of flags set, from 0 to 100.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        let done = self.flags.load(Ordering::Acquire).count_ones();
        f64::from(done) / f64::from(ALL_DONE.count_ones()) * 100.0
    }

    /// Returns true once all seven flags are set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.flags.load(Ordering::Acquire) == ALL_DONE
    }

    /// Record the bounds resolved for this run.
    pub fn set_bounds(&self, bounds: CollectionBounds) {
        *self.bounds.write() = Some(bounds);
    }

    /// The bounds resolved for this run, if resolution has finished.
    #[must_use]
    pub fn bounds(&self) -> Option<CollectionBounds> {
        self.bounds.read().clone()
    }

    /// Publish the run's final status.
    pub fn finish(&self, status: RunStatus) {
        self.status.send_replace(status);
    }

    /// Current overall status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// Wait until the run leaves `Running` and return its final status.
    pub async fn wait(&self) -> RunStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(RunStatus::is_finished).await {
            Ok(status) => (*status).clone(),
            Err(_) => self.status(),
        }
    }

    /// Capture the run's current state.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            run_id: self.run_id,
            code: self.code.clone(),
            percent: self.percent_complete(),
            done: self.done(),
            status: self.status(),
            bounds: self.bounds(),
            started_at: self.started_at,
        }
    }
}

#[derive(Default)]
struct Registry {
    runs: HashMap<RunId, Arc<RunProgress>>,
    order: VecDeque<RunId>,
    latest: Option<Arc<RunProgress>>,
}

/// Registry of recent runs.
///
/// Finished runs beyond the retention limit are evicted oldest first. Running
/// runs and the latest run are never evicted.
pub struct ProgressTracker {
    registry: RwLock<Registry>,
    retained: usize,
}

impl ProgressTracker {
    /// Create a tracker keeping up to `retained` runs.
    #[must_use]
    pub fn new(retained: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            retained: retained.max(1),
        }
    }

    /// Start tracking a new run for `code` and make it the latest.
    pub fn reset(&self, code: CollectionCode) -> Arc<RunProgress> {
        let run = Arc::new(RunProgress::new(code));

        let mut registry = self.registry.write();
        registry.runs.insert(run.run_id(), Arc::clone(&run));
        registry.order.push_back(run.run_id());
        registry.latest = Some(Arc::clone(&run));
        self.evict(&mut registry);

        tracing::debug!(run_id = %run.run_id(), code = %run.code(), "Progress reset");
        run
    }

    fn evict(&self, registry: &mut Registry) {
        while registry.order.len() > self.retained {
            let latest = registry.latest.as_ref().map(|run| run.run_id());
            let victim = registry.order.iter().position(|id| {
                Some(*id) != latest
                    && registry
                        .runs
                        .get(id)
                        .map_or(true, |run| run.status().is_finished())
            });

            let Some(index) = victim else { break };
            if let Some(id) = registry.order.remove(index) {
                registry.runs.remove(&id);
            }
        }
    }

    /// Look up a run.
    #[must_use]
    pub fn get(&self, run_id: &RunId) -> Option<Arc<RunProgress>> {
        self.registry.read().runs.get(run_id).cloned()
    }

    /// The most recently started run.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<RunProgress>> {
        self.registry.read().latest.clone()
    }

    /// Percent complete of the latest run, or 0 if none has started.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        self.latest().map_or(0.0, |run| run.percent_complete())
    }

    /// Number of tracked runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().runs.len()
    }

    /// Returns true if no run has been tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().runs.is_empty()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CollectionCode {
        CollectionCode::new(s).unwrap()
    }

    #[test]
    fn fresh_run_is_zero() {
        let run = RunProgress::new(code("C1"));
        assert!((run.percent_complete() - 0.0).abs() < f64::EPSILON);
        assert!(run.done().is_empty());
        assert_eq!(run.pending().len(), Dimension::COUNT);
        assert_eq!(run.status(), RunStatus::Running);
    }

    #[test]
    fn progress_is_monotonic() {
        let run = RunProgress::new(code("C1"));
        let mut last = run.percent_complete();
        for dimension in Dimension::ALL {
            run.mark_done(dimension);
            let now = run.percent_complete();
            assert!(now > last);
            last = now;
        }
        assert!((last - 100.0).abs() < 1e-9);
        assert!(run.is_complete());
    }

    #[test]
    fn mark_done_is_idempotent() {
        let run = RunProgress::new(code("C1"));
        run.mark_done(Dimension::Hour);
        let once = run.percent_complete();
        run.mark_done(Dimension::Hour);
        assert!((run.percent_complete() - once).abs() < f64::EPSILON);
        assert!((once - 100.0 / 7.0).abs() < 1e-9);
        assert_eq!(run.done(), vec![Dimension::Hour]);
    }

    #[test]
    fn tracker_reports_latest_run() {
        let tracker = ProgressTracker::new(4);
        assert!((tracker.percent_complete() - 0.0).abs() < f64::EPSILON);

        let first = tracker.reset(code("C1"));
        for dimension in Dimension::ALL {
            first.mark_done(dimension);
        }
        assert!((tracker.percent_complete() - 100.0).abs() < 1e-9);

        let second = tracker.reset(code("C1"));
        assert!((tracker.percent_complete() - 0.0).abs() < f64::EPSILON);
        assert_eq!(tracker.latest().unwrap().run_id(), second.run_id());
        assert!(tracker.get(&first.run_id()).is_some());
    }

    #[test]
    fn tracker_evicts_finished_runs_only() {
        let tracker = ProgressTracker::new(2);

        let running = tracker.reset(code("C1"));
        let finished = tracker.reset(code("C2"));
        finished.finish(RunStatus::Completed);
        let latest = tracker.reset(code("C3"));

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(&running.run_id()).is_some());
        assert!(tracker.get(&finished.run_id()).is_none());
        assert!(tracker.get(&latest.run_id()).is_some());
    }

    #[test]
    fn snapshot_carries_bounds_and_status() {
        use chrono::TimeZone;

        let run = RunProgress::new(code("C1"));
        let bounds = CollectionBounds::new(
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
        );
        run.set_bounds(bounds.clone());
        run.mark_done(Dimension::Day);
        run.finish(RunStatus::Failed {
            failed: run.pending(),
        });

        let snapshot = run.snapshot();
        assert_eq!(snapshot.bounds, Some(bounds));
        assert_eq!(snapshot.done, vec![Dimension::Day]);
        assert!(matches!(snapshot.status, RunStatus::Failed { ref failed } if failed.len() == 6));
    }

    #[tokio::test]
    async fn wait_returns_final_status() {
        let run = Arc::new(RunProgress::new(code("C1")));
        let waiter = {
            let run = Arc::clone(&run);
            tokio::spawn(async move { run.wait().await })
        };

        run.finish(RunStatus::Completed);
        assert_eq!(waiter.await.unwrap(), RunStatus::Completed);
    }
}
