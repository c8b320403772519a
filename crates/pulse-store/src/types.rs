//! Domain types stored in the database.
//!
//! These types represent ingested records and the aggregate rows computed from
//! them.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use pulse_core::{CollectionCode, Facet, Granularity, RecordId};
use serde::{Deserialize, Serialize};

/// One ingested social-media record.
///
/// Records are immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Unique identifier, fixed at ingestion.
    pub record_id: RecordId,
    /// Collection the record belongs to.
    pub code: CollectionCode,
    /// Creation time, reported back on drill-down.
    pub created_at: DateTime<Utc>,
    /// Last-update time, used for bounds and bucketing. Records without one are
    /// never counted.
    pub timestamp: Option<DateTime<Utc>>,
    /// Text of the post.
    pub text: String,
    /// Physical location of the attached image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Classifier label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Sentiment label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Image damage class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<String>,
    /// Image relevancy flag (`ir_true` / `ir_false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_relevancy: Option<String>,
}

impl RawRecord {
    /// Create a record with no image and no facet values.
    ///
    /// The record gets a freshly generated ID and its bucketing timestamp
    /// defaults to the creation time.
    #[must_use]
    pub fn new(code: CollectionCode, created_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            record_id: RecordId::generate(),
            code,
            created_at,
            timestamp: Some(created_at),
            text: text.into(),
            image: None,
            label: None,
            sentiment: None,
            damage: None,
            image_relevancy: None,
        }
    }

    /// Key the record by the ID its source assigned it.
    ///
    /// Loading a record with the same source ID again overwrites it.
    #[must_use]
    pub fn with_source_id(mut self, source_id: &str) -> Self {
        self.record_id = RecordId::derive(&self.code, source_id);
        self
    }

    /// Attach an image location.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Override the bucketing timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set one facet value.
    #[must_use]
    pub fn with_facet(mut self, facet: Facet, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match facet {
            Facet::Label => self.label = value,
            Facet::Sentiment => self.sentiment = value,
            Facet::Damage => self.damage = value,
            Facet::ImageRelevancy => self.image_relevancy = value,
        }
        self
    }

    /// Get the value of a facet, if present.
    #[must_use]
    pub fn facet(&self, facet: Facet) -> Option<&str> {
        match facet {
            Facet::Label => self.label.as_deref(),
            Facet::Sentiment => self.sentiment.as_deref(),
            Facet::Damage => self.damage.as_deref(),
            Facet::ImageRelevancy => self.image_relevancy.as_deref(),
        }
    }

    /// Iterate over the facet values this record carries.
    pub fn facets(&self) -> impl Iterator<Item = (Facet, &str)> {
        Facet::ALL
            .into_iter()
            .filter_map(move |facet| self.facet(facet).map(|value| (facet, value)))
    }
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// The bucket of the given granularity containing `ts`.
    #[must_use]
    pub fn bucket(granularity: Granularity, ts: DateTime<Utc>) -> Self {
        let start = granularity.truncate(ts);
        Self {
            start,
            end: start + granularity.width(),
        }
    }

    /// Check whether `ts` falls within the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// A facet constraint on a record query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFilter {
    /// Facet to match on.
    pub facet: Facet,
    /// Required value.
    pub value: String,
}

/// Parameters of a `records_matching` query.
///
/// Without a range, every record of the collection is returned, including
/// records without a timestamp. With a range, only timestamped records within
/// it are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Optional facet constraint.
    pub facet: Option<FacetFilter>,
    /// Optional time window.
    pub range: Option<TimeRange>,
}

impl RecordQuery {
    /// Match every record of the collection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to records whose facet equals `value`.
    #[must_use]
    pub fn with_facet(mut self, facet: Facet, value: impl Into<String>) -> Self {
        self.facet = Some(FacetFilter {
            facet,
            value: value.into(),
        });
        self
    }

    /// Restrict to records within `range`.
    #[must_use]
    pub const fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Check the facet constraint against a record.
    #[must_use]
    pub fn matches_facet(&self, record: &RawRecord) -> bool {
        self.facet
            .as_ref()
            .map_or(true, |f| record.facet(f.facet) == Some(f.value.as_str()))
    }
}

/// Count of records in one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucketAggregate {
    /// Collection the count belongs to.
    pub code: CollectionCode,
    /// Bucket width.
    pub granularity: Granularity,
    /// Bucket start, truncated to the granularity.
    pub bucket: DateTime<Utc>,
    /// Number of records in the bucket.
    pub count: u64,
}

impl TimeBucketAggregate {
    /// Calendar date of the bucket.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.bucket.date_naive()
    }

    /// Hour of the bucket, for hour and minute granularity.
    #[must_use]
    pub fn hour(&self) -> Option<u32> {
        (self.granularity <= Granularity::Hour).then(|| self.bucket.hour())
    }

    /// Minute of the bucket, for minute granularity.
    #[must_use]
    pub fn minute(&self) -> Option<u32> {
        (self.granularity == Granularity::Minute).then(|| self.bucket.minute())
    }
}

/// Count of records with one facet value in one minute bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetAggregate {
    /// Collection the count belongs to.
    pub code: CollectionCode,
    /// Facet the value belongs to.
    pub facet: Facet,
    /// The facet value.
    pub value: String,
    /// Minute bucket start.
    pub bucket: DateTime<Utc>,
    /// Number of matching records in the bucket.
    pub count: u64,
}

impl FacetAggregate {
    /// Calendar date of the bucket.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.bucket.date_naive()
    }

    /// Hour of the bucket.
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.bucket.hour()
    }

    /// Minute of the bucket.
    #[must_use]
    pub fn minute(&self) -> u32 {
        self.bucket.minute()
    }
}
