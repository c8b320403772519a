//! Aggregation dimensions.
//!
//! A precomputation run produces one aggregate set per [`Dimension`]: three
//! time granularities and four categorical facets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Time-bucketing resolution.
///
/// Ordered finest first, so `Granularity::Minute < Granularity::Day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Granularity {
    /// Date, hour, and minute.
    Minute = 1,
    /// Date and hour.
    Hour = 2,
    /// Calendar date.
    Day = 3,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// The granularity facet aggregates are bucketed at.
    pub const FINEST: Self = Self::Minute;

    /// Convert the granularity to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `Granularity`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Minute),
            2 => Some(Self::Hour),
            3 => Some(Self::Day),
            _ => None,
        }
    }

    /// Lowercase name of the granularity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Width of one bucket in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
        }
    }

    /// Width of one bucket.
    #[must_use]
    pub fn width(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Truncate a timestamp to the start of its bucket.
    ///
    /// Day buckets are UTC calendar dates.
    #[must_use]
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.seconds();
        let floored = ts.timestamp().div_euclid(width) * width;
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }

    /// Exclusive end of the bucket containing `ts`.
    #[must_use]
    pub fn bucket_end(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        self.truncate(ts) + self.width()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            other => Err(CoreError::UnknownDimension(other.to_string())),
        }
    }
}

/// A categorical attribute of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Facet {
    /// Classifier label assigned to the record's text.
    Label = 1,
    /// Sentiment of the record's text.
    Sentiment = 2,
    /// Damage class assigned to the record's image.
    Damage = 3,
    /// Whether the record's image is relevant.
    ImageRelevancy = 4,
}

impl Facet {
    /// All facets.
    pub const ALL: [Self; 4] = [Self::Label, Self::Sentiment, Self::Damage, Self::ImageRelevancy];

    /// Convert the facet to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `Facet`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Label),
            2 => Some(Self::Sentiment),
            3 => Some(Self::Damage),
            4 => Some(Self::ImageRelevancy),
            _ => None,
        }
    }

    /// Snake-case name of the facet.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Sentiment => "sentiment",
            Self::Damage => "damage",
            Self::ImageRelevancy => "image_relevancy",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facet {
    type Err = CoreError;

    /// Parse a facet name. `class` and `relevancy` are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" | "class" => Ok(Self::Label),
            "sentiment" => Ok(Self::Sentiment),
            "damage" => Ok(Self::Damage),
            "image_relevancy" | "relevancy" => Ok(Self::ImageRelevancy),
            other => Err(CoreError::UnknownDimension(other.to_string())),
        }
    }
}

/// One of the seven aggregate sets a precomputation run produces.
///
/// Each dimension is computed by exactly one job, and each job owns exactly one
/// progress flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Day-bucketed counts.
    Day,
    /// Hour-bucketed counts.
    Hour,
    /// Minute-bucketed counts.
    Minute,
    /// Per-label minute counts.
    Label,
    /// Per-sentiment minute counts.
    Sentiment,
    /// Per-damage-class minute counts.
    Damage,
    /// Per-relevancy minute counts.
    ImageRelevancy,
}

impl Dimension {
    /// All seven dimensions, in job launch order.
    pub const ALL: [Self; 7] = [
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Label,
        Self::Sentiment,
        Self::Damage,
        Self::ImageRelevancy,
    ];

    /// Number of dimensions, and therefore jobs, per run.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this dimension in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Day => 0,
            Self::Hour => 1,
            Self::Minute => 2,
            Self::Label => 3,
            Self::Sentiment => 4,
            Self::Damage => 5,
            Self::ImageRelevancy => 6,
        }
    }

    /// Single-bit mask for this dimension's progress flag.
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.index()
    }

    /// Snake-case name of the dimension, also used as the job name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Label => "label",
            Self::Sentiment => "sentiment",
            Self::Damage => "damage",
            Self::ImageRelevancy => "image_relevancy",
        }
    }

    /// The granularity, for time-bucket dimensions.
    #[must_use]
    pub const fn granularity(self) -> Option<Granularity> {
        match self {
            Self::Day => Some(Granularity::Day),
            Self::Hour => Some(Granularity::Hour),
            Self::Minute => Some(Granularity::Minute),
            _ => None,
        }
    }

    /// The facet, for facet dimensions.
    #[must_use]
    pub const fn facet(self) -> Option<Facet> {
        match self {
            Self::Label => Some(Facet::Label),
            Self::Sentiment => Some(Facet::Sentiment),
            Self::Damage => Some(Facet::Damage),
            Self::ImageRelevancy => Some(Facet::ImageRelevancy),
            _ => None,
        }
    }
}

impl From<Granularity> for Dimension {
    fn from(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Minute => Self::Minute,
            Granularity::Hour => Self::Hour,
            Granularity::Day => Self::Day,
        }
    }
}

impl From<Facet> for Dimension {
    fn from(facet: Facet) -> Self {
        match facet {
            Facet::Label => Self::Label,
            Facet::Sentiment => Self::Sentiment,
            Facet::Damage => Self::Damage,
            Facet::ImageRelevancy => Self::ImageRelevancy,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Granularity>()
            .map(Self::from)
            .or_else(|_| s.parse::<Facet>().map(Self::from))
            .map_err(|_| CoreError::UnknownDimension(s.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, d, h, m, s).unwrap()
    }

    #[test]
    fn truncate_to_each_granularity() {
        let ts = at(1, 10, 40, 59);
        assert_eq!(Granularity::Minute.truncate(ts), at(1, 10, 40, 0));
        assert_eq!(Granularity::Hour.truncate(ts), at(1, 10, 0, 0));
        assert_eq!(Granularity::Day.truncate(ts), at(1, 0, 0, 0));
    }

    #[test]
    fn truncate_is_idempotent() {
        for g in Granularity::ALL {
            let once = g.truncate(at(2, 23, 59, 59));
            assert_eq!(g.truncate(once), once);
        }
    }

    #[test]
    fn truncate_before_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 15).unwrap();
        let day = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(Granularity::Day.truncate(ts), day);
    }

    #[test]
    fn bucket_end_is_exclusive_upper_bound() {
        assert_eq!(Granularity::Hour.bucket_end(at(1, 10, 5, 0)), at(1, 11, 0, 0));
        assert_eq!(Granularity::Day.bucket_end(at(1, 10, 5, 0)), at(2, 0, 0, 0));
    }

    #[test]
    fn coarser_buckets_contain_finer_ones() {
        let ts = at(1, 10, 40, 0);
        let minute = Granularity::Minute.truncate(ts);
        assert_eq!(Granularity::Hour.truncate(minute), Granularity::Hour.truncate(ts));
        assert!(Granularity::Minute < Granularity::Hour);
        assert!(Granularity::Hour < Granularity::Day);
    }

    #[test]
    fn dimension_bits_are_distinct() {
        let mask = Dimension::ALL.iter().fold(0u8, |acc, d| {
            assert_eq!(acc & d.bit(), 0);
            acc | d.bit()
        });
        assert_eq!(mask.count_ones() as usize, Dimension::COUNT);
    }

    #[test]
    fn parse_names_and_aliases() {
        assert_eq!("hour".parse::<Dimension>().unwrap(), Dimension::Hour);
        assert_eq!("class".parse::<Facet>().unwrap(), Facet::Label);
        assert_eq!("relevancy".parse::<Dimension>().unwrap(), Dimension::ImageRelevancy);
        assert_eq!(" Sentiment ".parse::<Facet>().unwrap(), Facet::Sentiment);
        assert!(matches!(
            "week".parse::<Dimension>(),
            Err(CoreError::UnknownDimension(_))
        ));
    }

    #[test]
    fn dimension_projections() {
        for d in Dimension::ALL {
            assert!(d.granularity().is_some() != d.facet().is_some());
            assert_eq!(d.as_str().parse::<Dimension>().unwrap(), d);
        }
        assert_eq!(Dimension::from(Facet::Damage), Dimension::Damage);
        assert_eq!(Dimension::from(Granularity::Day).granularity(), Some(Granularity::Day));
    }

    #[test]
    fn u8_roundtrip() {
        for g in Granularity::ALL {
            assert_eq!(Granularity::from_u8(g.as_u8()), Some(g));
        }
        for f in Facet::ALL {
            assert_eq!(Facet::from_u8(f.as_u8()), Some(f));
        }
        assert_eq!(Facet::from_u8(0), None);
    }
}
