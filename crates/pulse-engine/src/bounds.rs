//! Collection bounds resolution.
//!
//! Every precomputation run starts by resolving the temporal span of its
//! collection. This is also the one place an unknown collection code is caught.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Granularity};
use pulse_store::{RecordStore, TimeRange};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Temporal span of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBounds {
    /// Earliest record timestamp.
    pub min: DateTime<Utc>,
    /// Latest record timestamp.
    pub max: DateTime<Utc>,
    /// Calendar days between the dates of `max` and `min`.
    pub span_days: i64,
}

impl CollectionBounds {
    /// Build bounds from the earliest and latest timestamps.
    #[must_use]
    pub fn new(min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        let span_days = (max.date_naive() - min.date_naive()).num_days();
        Self { min, max, span_days }
    }

    /// The range of whole buckets covering the collection.
    #[must_use]
    pub fn range(&self, granularity: Granularity) -> TimeRange {
        TimeRange {
            start: granularity.truncate(self.min),
            end: granularity.bucket_end(self.max),
        }
    }
}

/// Resolves a collection's bounds from the record store.
pub struct CollectionBoundsResolver<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> CollectionBoundsResolver<S> {
    /// Create a resolver over a record store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve the earliest and latest timestamps of a collection.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownCollection` if no timestamped record carries
    /// the code, or `EngineError::StoreUnavailable` if the store query fails.
    pub fn resolve(&self, code: &CollectionCode) -> Result<CollectionBounds> {
        let min = self
            .store
            .min_timestamp(code)?
            .ok_or_else(|| EngineError::UnknownCollection(code.to_string()))?;

        // A record landing between the two queries can only move max forward.
        let max = self.store.max_timestamp(code)?.unwrap_or(min);

        Ok(CollectionBounds::new(min, max.max(min)))
    }
}
