//! Request and response types for engine operations.
//!
//! These types define the caller-facing contracts for starting runs, polling
//! their progress, and reading aggregates back.

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Dimension, Facet, Granularity, RunId};
use pulse_store::{FacetAggregate, TimeBucketAggregate, TimeRange};
use serde::{Deserialize, Serialize};

use crate::bounds::CollectionBounds;

/// Where facet-value discovery looks for distinct values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryScope {
    /// Values from every collection. Values absent from the target collection
    /// produce no rows.
    #[default]
    Global,
    /// Only values occurring in the target collection.
    Collection,
}

/// Configuration for the precomputation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Where facet-value discovery looks.
    #[serde(default)]
    pub discovery_scope: DiscoveryScope,

    /// Fixed value set of the image relevancy facet.
    #[serde(default = "EngineConfig::default_relevancy_values")]
    pub relevancy_values: Vec<String>,

    /// Finished runs kept in the progress registry before the oldest are evicted.
    #[serde(default = "EngineConfig::default_retained_runs")]
    pub retained_runs: usize,
}

impl EngineConfig {
    fn default_relevancy_values() -> Vec<String> {
        vec!["ir_true".to_string(), "ir_false".to_string()]
    }

    const fn default_retained_runs() -> usize {
        16
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_scope: DiscoveryScope::default(),
            relevancy_values: Self::default_relevancy_values(),
            retained_runs: Self::default_retained_runs(),
        }
    }
}

/// Handle to a launched precomputation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// ID to poll progress with.
    pub run_id: RunId,
    /// Collection being precomputed.
    pub code: CollectionCode,
    /// Bounds resolved before the jobs were launched.
    pub bounds: CollectionBounds,
}

/// Overall state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Bounds are being resolved or jobs are in flight.
    Running,
    /// Every job finished and set its flag.
    Completed,
    /// Every job finished, but these failed and left their flag unset.
    Failed {
        /// Dimensions whose job failed.
        failed: Vec<Dimension>,
    },
    /// The run stopped before launching any job.
    Rejected {
        /// Why the run was rejected.
        reason: String,
    },
}

impl RunStatus {
    /// Returns true once the run will make no further progress.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Point-in-time view of one run's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// The run.
    pub run_id: RunId,
    /// Collection being precomputed.
    pub code: CollectionCode,
    /// Share of the seven jobs done, 0 to 100.
    pub percent: f64,
    /// Dimensions whose job has completed.
    pub done: Vec<Dimension>,
    /// Overall run state.
    pub status: RunStatus,
    /// Resolved bounds, once known.
    pub bounds: Option<CollectionBounds>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// Facet constraint for a drill-down query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecordFilter {
    /// No facet constraint; every record in the window.
    Frequency,
    /// Records whose facet equals `value`.
    Facet {
        /// Facet to match on.
        facet: Facet,
        /// Required value.
        value: String,
    },
}

/// One bucket to drill into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Bucket width.
    pub granularity: Granularity,
    /// Any instant inside the bucket; truncated to its start.
    pub start: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window over the bucket containing `start`.
    #[must_use]
    pub const fn new(granularity: Granularity, start: DateTime<Utc>) -> Self {
        Self { granularity, start }
    }

    /// The half-open range the window covers.
    #[must_use]
    pub fn range(&self) -> TimeRange {
        TimeRange::bucket(self.granularity, self.start)
    }
}

/// A record's text and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    /// Post text.
    pub text: String,
    /// Creation time.
    pub time: DateTime<Utc>,
}

/// A record's image location and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Image location.
    pub image: String,
    /// Creation time.
    pub time: DateTime<Utc>,
}

/// Records behind one aggregate bucket.
///
/// Only records carrying an image contribute to `images`, so the two lists
/// may differ in length. Imageless records yield no placeholder entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecordsView {
    /// Texts, ordered by time.
    pub texts: Vec<TextEntry>,
    /// Images, ordered by time. Records without an image are omitted.
    pub images: Vec<ImageEntry>,
}

/// Precomputed rows for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Aggregates {
    /// Rows of a day, hour, or minute dimension.
    TimeBuckets(Vec<TimeBucketAggregate>),
    /// Rows of a facet dimension.
    Facets(Vec<FacetAggregate>),
}

impl Aggregates {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::TimeBuckets(rows) => rows.len(),
            Self::Facets(rows) => rows.len(),
        }
    }

    /// Returns true if nothing has been precomputed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every aggregate set of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOverview {
    /// The collection.
    pub code: CollectionCode,
    /// Day buckets.
    pub day: Vec<TimeBucketAggregate>,
    /// Hour buckets.
    pub hour: Vec<TimeBucketAggregate>,
    /// Minute buckets.
    pub minute: Vec<TimeBucketAggregate>,
    /// Label rows.
    pub label: Vec<FacetAggregate>,
    /// Sentiment rows.
    pub sentiment: Vec<FacetAggregate>,
    /// Damage class rows.
    pub damage: Vec<FacetAggregate>,
    /// Image relevancy rows.
    pub image_relevancy: Vec<FacetAggregate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.discovery_scope, DiscoveryScope::Global);
        assert_eq!(config.relevancy_values, vec!["ir_true", "ir_false"]);
        assert_eq!(config.retained_runs, 16);
    }

    #[test]
    fn engine_config_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"discovery_scope":"collection"}"#).unwrap();
        assert_eq!(config.discovery_scope, DiscoveryScope::Collection);
        assert_eq!(config.relevancy_values.len(), 2);
    }

    #[test]
    fn run_status_finished() {
        assert!(!RunStatus::Running.is_finished());
        assert!(RunStatus::Completed.is_finished());
        assert!(RunStatus::Failed { failed: vec![Dimension::Day] }.is_finished());
    }

    #[test]
    fn time_window_truncates_start() {
        let window = TimeWindow::new(
            Granularity::Hour,
            Utc.with_ymd_and_hms(2021, 1, 1, 10, 40, 0).unwrap(),
        );
        let range = window.range();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2021, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn record_filter_json_shape() {
        let filter = RecordFilter::Facet {
            facet: Facet::Sentiment,
            value: "positive".into(),
        };
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["mode"], "facet");
        assert_eq!(json["facet"], "sentiment");
    }
}
