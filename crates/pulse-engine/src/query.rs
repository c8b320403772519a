//! Read-side queries over precomputed aggregates and raw records.

use std::sync::Arc;

use pulse_core::{CollectionCode, Dimension, Facet, Granularity, IdError};
use pulse_store::{FacetAggregate, RecordQuery, Store, StoreError, TimeBucketAggregate};

use crate::error::{EngineError, Result};
use crate::types::{
    Aggregates, CollectionOverview, ImageEntry, RawRecordsView, RecordFilter, TextEntry,
    TimeWindow,
};

/// Parse a caller-supplied collection code.
///
/// # Errors
///
/// Returns `EngineError::MissingCollectionCode` if the code is empty, or
/// `EngineError::InvalidArgument` if it is longer than any stored code can be.
pub fn parse_code(code: &str) -> Result<CollectionCode> {
    CollectionCode::new(code).map_err(|e| match e {
        IdError::EmptyCollectionCode => EngineError::MissingCollectionCode,
        other => EngineError::InvalidArgument(other.into()),
    })
}

/// Map a missing aggregate set to an empty one.
fn or_empty<T>(result: pulse_store::Result<Vec<T>>) -> Result<Vec<T>> {
    match result {
        Ok(rows) => Ok(rows),
        Err(StoreError::NotFound) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Serves stored aggregates and drill-down views.
pub struct QueryService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> QueryService<S> {
    /// Create a query service over a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Stored rows of one granularity, ordered by bucket.
    ///
    /// Empty if the collection was never precomputed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the read fails.
    pub fn time_buckets(
        &self,
        code: &CollectionCode,
        granularity: Granularity,
    ) -> Result<Vec<TimeBucketAggregate>> {
        or_empty(self.store.read_time_bucket_aggregates(code, granularity))
    }

    /// Stored rows of one facet, ordered by bucket and then value.
    ///
    /// Empty if the collection was never precomputed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the read fails.
    pub fn facets(&self, code: &CollectionCode, facet: Facet) -> Result<Vec<FacetAggregate>> {
        or_empty(self.store.read_facet_aggregates(code, facet))
    }

    /// Stored rows of any dimension.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the read fails.
    pub fn aggregates(&self, code: &CollectionCode, dimension: Dimension) -> Result<Aggregates> {
        if let Some(granularity) = dimension.granularity() {
            return Ok(Aggregates::TimeBuckets(self.time_buckets(code, granularity)?));
        }
        match dimension.facet() {
            Some(facet) => Ok(Aggregates::Facets(self.facets(code, facet)?)),
            None => Err(EngineError::Internal(format!(
                "dimension {dimension} has no aggregate set"
            ))),
        }
    }

    /// Every aggregate set of a collection.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if any read fails.
    pub fn overview(&self, code: &CollectionCode) -> Result<CollectionOverview> {
        Ok(CollectionOverview {
            code: code.clone(),
            day: self.time_buckets(code, Granularity::Day)?,
            hour: self.time_buckets(code, Granularity::Hour)?,
            minute: self.time_buckets(code, Granularity::Minute)?,
            label: self.facets(code, Facet::Label)?,
            sentiment: self.facets(code, Facet::Sentiment)?,
            damage: self.facets(code, Facet::Damage)?,
            image_relevancy: self.facets(code, Facet::ImageRelevancy)?,
        })
    }

    /// Texts and images of the records behind one bucket, in time order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the record query fails.
    pub fn raw_records(
        &self,
        code: &CollectionCode,
        filter: &RecordFilter,
        window: TimeWindow,
    ) -> Result<RawRecordsView> {
        let mut query = RecordQuery::all().with_range(window.range());
        if let RecordFilter::Facet { facet, value } = filter {
            query = query.with_facet(*facet, value.clone());
        }

        let records = self.store.records_matching(code, &query)?;

        let mut view = RawRecordsView::default();
        for record in records {
            if let Some(image) = record.image {
                view.images.push(ImageEntry {
                    image,
                    time: record.created_at,
                });
            }
            view.texts.push(TextEntry {
                text: record.text,
                time: record.created_at,
            });
        }

        tracing::debug!(
            code = %code,
            granularity = %window.granularity,
            texts = view.texts.len(),
            images = view.images.len(),
            "Raw records retrieved"
        );

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pulse_store::{AggregateStore, RawRecord, RecordStore, RocksStore};
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, m, 0).unwrap()
    }

    fn setup() -> (QueryService<RocksStore>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (QueryService::new(Arc::clone(&store)), store, dir)
    }

    #[test]
    fn parse_code_rejects_empty() {
        assert!(matches!(parse_code(""), Err(EngineError::MissingCollectionCode)));
        assert!(matches!(parse_code(" \t"), Err(EngineError::MissingCollectionCode)));
        assert_eq!(parse_code(" C1 ").unwrap().as_str(), "C1");
    }

    #[test]
    fn parse_code_rejects_oversized() {
        let long = "x".repeat(CollectionCode::MAX_LEN + 1);
        let err = parse_code(&long).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn never_precomputed_is_empty() {
        let (query, _store, _dir) = setup();
        let code = parse_code("C1").unwrap();

        assert!(query.time_buckets(&code, Granularity::Hour).unwrap().is_empty());
        assert!(query.aggregates(&code, Dimension::Label).unwrap().is_empty());

        let overview = query.overview(&code).unwrap();
        assert!(overview.day.is_empty());
        assert!(overview.image_relevancy.is_empty());
    }

    #[test]
    fn aggregates_dispatch_by_dimension() {
        let (query, store, _dir) = setup();
        let code = parse_code("C1").unwrap();
        store
            .replace_time_bucket_aggregates(
                &code,
                Granularity::Hour,
                &[TimeBucketAggregate {
                    code: code.clone(),
                    granularity: Granularity::Hour,
                    bucket: at(10, 0),
                    count: 3,
                }],
            )
            .unwrap();

        match query.aggregates(&code, Dimension::Hour).unwrap() {
            Aggregates::TimeBuckets(rows) => assert_eq!(rows[0].count, 3),
            Aggregates::Facets(_) => panic!("expected time buckets"),
        }
    }

    #[test]
    fn drill_down_filters_and_orders() {
        let (query, store, _dir) = setup();
        let code = parse_code("C1").unwrap();
        store
            .put_records(&[
                RawRecord::new(code.clone(), at(10, 50), "late")
                    .with_image("img/late.jpg")
                    .with_facet(Facet::Sentiment, "negative"),
                RawRecord::new(code.clone(), at(10, 5), "early")
                    .with_facet(Facet::Sentiment, "negative"),
                RawRecord::new(code.clone(), at(10, 30), "positive one")
                    .with_facet(Facet::Sentiment, "positive"),
                RawRecord::new(code.clone(), at(11, 0), "next hour")
                    .with_facet(Facet::Sentiment, "negative"),
            ])
            .unwrap();

        let view = query
            .raw_records(
                &code,
                &RecordFilter::Facet {
                    facet: Facet::Sentiment,
                    value: "negative".into(),
                },
                TimeWindow::new(Granularity::Hour, at(10, 0)),
            )
            .unwrap();

        let texts: Vec<_> = view.texts.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["early", "late"]);
        assert_eq!(view.images.len(), 1);
        assert_eq!(view.images[0].image, "img/late.jpg");
        assert_eq!(view.images[0].time, at(10, 50));

        let all = query
            .raw_records(
                &code,
                &RecordFilter::Frequency,
                TimeWindow::new(Granularity::Hour, at(10, 20)),
            )
            .unwrap();
        assert_eq!(all.texts.len(), 3);
    }
}
