//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `RecordStore` and
//! `AggregateStore` traits.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Facet, Granularity};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{FacetAggregate, RawRecord, RecordQuery, TimeBucketAggregate, TimeRange};
use crate::{AggregateStore, RecordStore};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode every value under a key prefix, in key order.
    fn scan_prefix<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            values.push(Self::deserialize(&value)?);
        }

        Ok(values)
    }

    /// Walk the record entries of a collection in key order.
    ///
    /// With a range, only timestamped records inside it are visited.
    fn scan_records(
        &self,
        code: &CollectionCode,
        range: Option<TimeRange>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let cf = self.cf(cf::RECORDS)?;
        let (seek, prefix) = match range {
            Some(range) => (
                keys::timestamped_seek(code, range.start),
                keys::timestamped_prefix(code),
            ),
            None => (keys::code_prefix(code), keys::code_prefix(code)),
        };

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&seek, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            if let Some(range) = range {
                let past_end = keys::record_key_timestamp(code, &key)
                    .map_or(true, |ts| ts >= range.end);
                if past_end {
                    break;
                }
            }

            visit(&key, &value)?;
        }

        Ok(())
    }

    /// Atomically drop every key under `prefix` and write `entries` in its place.
    fn replace_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let end = keys::prefix_end(prefix)
            .ok_or_else(|| StoreError::Database("aggregate prefix has no upper bound".into()))?;

        let mut batch = WriteBatch::default();
        batch.delete_range_cf(&cf, prefix, end.as_slice());
        for (key, value) in entries {
            batch.put_cf(&cf, key, value);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl RecordStore for RocksStore {
    fn min_timestamp(&self, code: &CollectionCode) -> Result<Option<DateTime<Utc>>> {
        let cf = self.cf(cf::RECORDS)?;
        let prefix = keys::timestamped_prefix(code);

        let first = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
            .next()
            .transpose()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(first
            .filter(|(key, _)| key.starts_with(&prefix))
            .and_then(|(key, _)| keys::record_key_timestamp(code, &key)))
    }

    fn max_timestamp(&self, code: &CollectionCode) -> Result<Option<DateTime<Utc>>> {
        let cf = self.cf(cf::RECORDS)?;
        let prefix = keys::timestamped_prefix(code);
        let end = keys::prefix_end(&prefix)
            .ok_or_else(|| StoreError::Database("record prefix has no upper bound".into()))?;

        // Reverse seek lands on the last key <= end; `end` itself is never a record key.
        let last = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&end, Direction::Reverse))
            .next()
            .transpose()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(last
            .filter(|(key, _)| key.starts_with(&prefix))
            .and_then(|(key, _)| keys::record_key_timestamp(code, &key)))
    }

    fn distinct_values(
        &self,
        facet: Facet,
        scope: Option<&CollectionCode>,
    ) -> Result<Vec<String>> {
        let cf = self.cf(cf::FACET_VALUES)?;
        let prefix = keys::facet_prefix(facet);

        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let (value, code) = keys::decode_facet_value_key(&key)
                .ok_or_else(|| StoreError::Database("malformed facet index key".into()))?;

            if scope.is_some_and(|scope| scope.as_bytes() != code) {
                continue;
            }

            values.push(value.to_string());
        }

        // Keys order by length-prefixed value, not lexically.
        values.sort();
        values.dedup();

        Ok(values)
    }

    fn for_each_timestamp(
        &self,
        code: &CollectionCode,
        range: TimeRange,
        visit: &mut dyn FnMut(DateTime<Utc>),
    ) -> Result<()> {
        self.scan_records(code, Some(range), &mut |key: &[u8], _: &[u8]| {
            if let Some(ts) = keys::record_key_timestamp(code, key) {
                visit(ts);
            }
            Ok(())
        })
    }

    fn for_each_matching(
        &self,
        code: &CollectionCode,
        query: &RecordQuery,
        visit: &mut dyn FnMut(RawRecord),
    ) -> Result<()> {
        self.scan_records(code, query.range, &mut |_: &[u8], value: &[u8]| {
            let record: RawRecord = Self::deserialize(value)?;
            if query.matches_facet(&record) {
                visit(record);
            }
            Ok(())
        })
    }

    fn put_records(&self, records: &[RawRecord]) -> Result<()> {
        let cf_records = self.cf(cf::RECORDS)?;
        let cf_values = self.cf(cf::FACET_VALUES)?;

        let mut batch = WriteBatch::default();
        for record in records {
            let key = keys::record_key(&record.code, record.timestamp, &record.record_id);
            batch.put_cf(&cf_records, key, Self::serialize(record)?);

            // Update facet-value index (idempotent)
            for (facet, value) in record.facets() {
                batch.put_cf(&cf_values, keys::facet_value_key(facet, value, &record.code), b"");
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(count = records.len(), "Stored records");

        Ok(())
    }
}

impl AggregateStore for RocksStore {
    fn replace_time_bucket_aggregates(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
        rows: &[TimeBucketAggregate],
    ) -> Result<()> {
        let entries = rows
            .iter()
            .map(|row| -> Result<(Vec<u8>, Vec<u8>)> {
                let key = keys::time_aggregate_key(code, granularity, row.bucket);
                Ok((key, Self::serialize(row)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.replace_prefix(
            cf::TIME_AGGREGATES,
            &keys::time_aggregate_prefix(code, granularity),
            entries,
        )
    }

    fn replace_facet_aggregates(
        &self,
        code: &CollectionCode,
        facet: Facet,
        rows: &[FacetAggregate],
    ) -> Result<()> {
        let entries = rows
            .iter()
            .map(|row| -> Result<(Vec<u8>, Vec<u8>)> {
                let key = keys::facet_aggregate_key(code, facet, &row.value, row.bucket);
                Ok((key, Self::serialize(row)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.replace_prefix(
            cf::FACET_AGGREGATES,
            &keys::facet_aggregate_prefix(code, facet),
            entries,
        )
    }

    fn read_time_bucket_aggregates(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
    ) -> Result<Vec<TimeBucketAggregate>> {
        let rows: Vec<TimeBucketAggregate> = self.scan_prefix(
            cf::TIME_AGGREGATES,
            &keys::time_aggregate_prefix(code, granularity),
        )?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(rows)
    }

    fn read_facet_aggregates(
        &self,
        code: &CollectionCode,
        facet: Facet,
    ) -> Result<Vec<FacetAggregate>> {
        let mut rows: Vec<FacetAggregate> = self.scan_prefix(
            cf::FACET_AGGREGATES,
            &keys::facet_aggregate_prefix(code, facet),
        )?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }

        // Keys group rows by value; readers expect time order.
        rows.sort_by(|a, b| a.bucket.cmp(&b.bucket).then_with(|| a.value.cmp(&b.value)));
        Ok(rows)
    }
}
