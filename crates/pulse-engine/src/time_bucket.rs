//! Time-bucket aggregation.
//!
//! One job per granularity counts the records of a collection in each bucket
//! of that width and replaces the stored rows for the granularity.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Dimension, Granularity};
use pulse_store::{Store, TimeBucketAggregate};

use crate::bounds::CollectionBounds;
use crate::error::Result;
use crate::progress::RunProgress;

/// Builds the day, hour, and minute aggregate sets.
pub struct TimeBucketAggregator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> TimeBucketAggregator<S> {
    /// Create an aggregator over a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Compute the rows of one granularity without writing them.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the record query fails.
    pub fn compute(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
        bounds: &CollectionBounds,
    ) -> Result<Vec<TimeBucketAggregate>> {
        let mut counts = BTreeMap::new();
        self.store
            .for_each_timestamp(code, bounds.range(granularity), &mut |ts: DateTime<Utc>| {
                *counts.entry(granularity.truncate(ts)).or_insert(0) += 1;
            })?;

        let rows = counts
            .into_iter()
            .map(|(bucket, count)| TimeBucketAggregate {
                code: code.clone(),
                granularity,
                bucket,
                count,
            })
            .collect();

        Ok(rows)
    }

    /// Recompute one granularity, replace its stored rows, and mark the
    /// dimension done on `progress`.
    ///
    /// Returns the number of rows written. The flag is left clear on error.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the query or the write fails.
    pub fn run(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
        bounds: &CollectionBounds,
        progress: &RunProgress,
    ) -> Result<usize> {
        let rows = self.compute(code, granularity, bounds)?;
        self.store
            .replace_time_bucket_aggregates(code, granularity, &rows)?;

        progress.mark_done(Dimension::from(granularity));

        tracing::info!(
            code = %code,
            granularity = %granularity,
            rows = rows.len(),
            "Time buckets aggregated"
        );

        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_store::{AggregateStore, RawRecord, RecordStore, RocksStore};
    use tempfile::TempDir;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, d, h, m, 0).unwrap()
    }

    #[test]
    fn compute_groups_by_truncated_bucket() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let code = CollectionCode::new("C1").unwrap();
        store
            .put_records(&[
                RawRecord::new(code.clone(), at(2, 9, 0), "c"),
                RawRecord::new(code.clone(), at(1, 10, 40), "b"),
                RawRecord::new(code.clone(), at(1, 10, 5), "a"),
                RawRecord::new(code.clone(), at(1, 10, 5), "a"),
            ])
            .unwrap();

        let bounds = CollectionBounds::new(at(1, 10, 5), at(2, 9, 0));
        let rows = TimeBucketAggregator::new(store)
            .compute(&code, Granularity::Hour, &bounds)
            .unwrap();

        let counts: Vec<_> = rows.iter().map(|r| (r.bucket, r.count)).collect();
        assert_eq!(counts, vec![(at(1, 10, 0), 3), (at(2, 9, 0), 1)]);
    }

    #[test]
    fn run_writes_rows_and_marks_done() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let code = CollectionCode::new("C1").unwrap();
        store
            .put_records(&[
                RawRecord::new(code.clone(), at(1, 10, 5), "a"),
                RawRecord::new(code.clone(), at(1, 10, 40), "b"),
                RawRecord::new(code.clone(), at(2, 9, 0), "c"),
            ])
            .unwrap();

        let bounds = CollectionBounds::new(at(1, 10, 5), at(2, 9, 0));
        let progress = RunProgress::new(code.clone());
        let aggregator = TimeBucketAggregator::new(Arc::clone(&store));

        let written = aggregator
            .run(&code, Granularity::Day, &bounds, &progress)
            .unwrap();

        assert_eq!(written, 2);
        assert!(progress.is_done(Dimension::Day));
        assert!(!progress.is_done(Dimension::Hour));

        let rows = store
            .read_time_bucket_aggregates(&code, Granularity::Day)
            .unwrap();
        let counts: Vec<_> = rows.iter().map(|r| (r.bucket, r.count)).collect();
        assert_eq!(counts, vec![(at(1, 0, 0), 2), (at(2, 0, 0), 1)]);
    }
}
