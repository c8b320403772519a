//! `RocksDB` storage layer for pulse.
//!
//! This crate provides the record store the precomputation engine reads from and
//! the aggregate store it writes to, both backed by `RocksDB` with column families
//! for efficient prefix scans.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `records`: Raw records, ordered by collection and then timestamp
//! - `facet_values`: Index of every facet value seen, per collection
//! - `time_aggregates`: Time-bucket counts, per collection and granularity
//! - `facet_aggregates`: Minute counts, per collection, facet, and value
//!
//! # Example
//!
//! ```no_run
//! use pulse_store::{AggregateStore, RecordStore, RocksStore};
//! use pulse_core::{CollectionCode, Granularity};
//!
//! let store = RocksStore::open("/tmp/pulse-db").unwrap();
//!
//! let code = CollectionCode::new("C1").unwrap();
//! let earliest = store.min_timestamp(&code).unwrap();
//! let hours = store.read_time_bucket_aggregates(&code, Granularity::Hour);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    FacetAggregate, FacetFilter, RawRecord, RecordQuery, TimeBucketAggregate, TimeRange,
};

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Facet, Granularity};

/// Query surface over ingested records.
///
/// Every query is scoped to one collection except facet-value discovery, which
/// may span the whole dataset.
pub trait RecordStore: Send + Sync {
    /// Earliest bucketing timestamp in a collection.
    ///
    /// Returns `None` if the collection has no timestamped records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn min_timestamp(&self, code: &CollectionCode) -> Result<Option<DateTime<Utc>>>;

    /// Latest bucketing timestamp in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn max_timestamp(&self, code: &CollectionCode) -> Result<Option<DateTime<Utc>>>;

    /// Distinct non-null values of a facet, in ascending order.
    ///
    /// With `scope` set, only values occurring in that collection are returned;
    /// otherwise values from every collection are.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn distinct_values(&self, facet: Facet, scope: Option<&CollectionCode>)
        -> Result<Vec<String>>;

    /// Visit the bucketing timestamp of every record of a collection within
    /// `range`, in ascending order.
    ///
    /// Record values are not decoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn for_each_timestamp(
        &self,
        code: &CollectionCode,
        range: TimeRange,
        visit: &mut dyn FnMut(DateTime<Utc>),
    ) -> Result<()>;

    /// Visit every record of a collection matching a query, ordered by
    /// timestamp, one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a record cannot be
    /// decoded.
    fn for_each_matching(
        &self,
        code: &CollectionCode,
        query: &RecordQuery,
        visit: &mut dyn FnMut(RawRecord),
    ) -> Result<()>;

    /// Records of a collection matching a query, ordered by timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn records_matching(
        &self,
        code: &CollectionCode,
        query: &RecordQuery,
    ) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        self.for_each_matching(code, query, &mut |record| records.push(record))?;
        Ok(records)
    }

    /// Insert a record.
    ///
    /// This also maintains the facet-value index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_record(&self, record: &RawRecord) -> Result<()> {
        self.put_records(std::slice::from_ref(record))
    }

    /// Insert a batch of records atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_records(&self, records: &[RawRecord]) -> Result<()>;
}

/// Persistent store for computed aggregate rows.
///
/// Each replace call swaps one job's whole output for a collection in a single
/// atomic write.
pub trait AggregateStore: Send + Sync {
    /// Replace all time-bucket rows for a collection and granularity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_time_bucket_aggregates(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
        rows: &[TimeBucketAggregate],
    ) -> Result<()>;

    /// Replace all facet rows for a collection and facet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_facet_aggregates(
        &self,
        code: &CollectionCode,
        facet: Facet,
        rows: &[FacetAggregate],
    ) -> Result<()>;

    /// Read time-bucket rows, ordered by bucket.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no rows exist for the collection and
    /// granularity.
    fn read_time_bucket_aggregates(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
    ) -> Result<Vec<TimeBucketAggregate>>;

    /// Read facet rows, ordered by bucket and then value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no rows exist for the collection and
    /// facet.
    fn read_facet_aggregates(
        &self,
        code: &CollectionCode,
        facet: Facet,
    ) -> Result<Vec<FacetAggregate>>;
}

/// A store serving both the record and aggregate surfaces.
pub trait Store: RecordStore + AggregateStore {}

impl<T: RecordStore + AggregateStore> Store for T {}
