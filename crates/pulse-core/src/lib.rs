//! Core types and utilities for pulse.
//!
//! This crate provides the foundational types used throughout the pulse
//! precomputation engine:
//!
//! - **Identifiers**: Strongly-typed IDs for collections, precomputation runs, and records
//! - **Dimensions**: The time granularities and categorical facets aggregates are built over
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use pulse_core::{CollectionCode, Dimension, Granularity};
//!
//! let code = CollectionCode::new("hurricane-2021").unwrap();
//! assert_eq!(code.as_str(), "hurricane-2021");
//!
//! let ts = Utc.with_ymd_and_hms(2021, 1, 1, 10, 40, 12).unwrap();
//! let bucket = Granularity::Hour.truncate(ts);
//! assert_eq!(bucket, Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap());
//!
//! let dimension: Dimension = "image_relevancy".parse().unwrap();
//! assert_eq!(dimension.as_str(), "image_relevancy");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod dimension;
pub mod error;
pub mod ids;

pub use dimension::{Dimension, Facet, Granularity};
pub use error::{CoreError, Result};
pub use ids::{CollectionCode, IdError, RecordId, RunId};
