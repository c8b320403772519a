//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Raw records, keyed by `code || ts_marker || timestamp || record_id`.
    pub const RECORDS: &str = "records";

    /// Index: facet values seen, keyed by `facet || value || code`.
    pub const FACET_VALUES: &str = "facet_values";

    /// Time-bucket aggregates, keyed by `code || granularity || bucket`.
    pub const TIME_AGGREGATES: &str = "time_aggregates";

    /// Facet aggregates, keyed by `code || facet || value || bucket`.
    pub const FACET_AGGREGATES: &str = "facet_aggregates";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::RECORDS,
        cf::FACET_VALUES,
        cf::TIME_AGGREGATES,
        cf::FACET_AGGREGATES,
    ]
}
