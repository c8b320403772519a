//! Facet aggregation.
//!
//! One job per facet discovers the facet's values, then counts, per value and
//! per minute, the collection's records carrying that value.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use pulse_core::{CollectionCode, Dimension, Facet, Granularity};
use pulse_store::{FacetAggregate, RawRecord, RecordQuery, Store};

use crate::bounds::CollectionBounds;
use crate::error::Result;
use crate::progress::RunProgress;
use crate::types::DiscoveryScope;

/// Builds the label, sentiment, damage, and image relevancy aggregate sets.
pub struct FacetAggregator<S: Store> {
    store: Arc<S>,
    scope: DiscoveryScope,
    relevancy_values: Vec<String>,
}

impl<S: Store> FacetAggregator<S> {
    /// Create an aggregator.
    ///
    /// `relevancy_values` is the fixed value set used for
    /// [`Facet::ImageRelevancy`] in place of discovery.
    #[must_use]
    pub fn new(store: Arc<S>, scope: DiscoveryScope, relevancy_values: Vec<String>) -> Self {
        Self {
            store,
            scope,
            relevancy_values,
        }
    }

    /// The values a facet is aggregated over for `code`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if the discovery query fails.
    pub fn discover(&self, code: &CollectionCode, facet: Facet) -> Result<Vec<String>> {
        if facet == Facet::ImageRelevancy {
            return Ok(self.relevancy_values.clone());
        }

        let scope = match self.scope {
            DiscoveryScope::Global => None,
            DiscoveryScope::Collection => Some(code),
        };
        Ok(self.store.distinct_values(facet, scope)?)
    }

    /// Compute the rows of one facet without writing them.
    ///
    /// Rows are ordered by bucket, then value. Values with no record in the
    /// collection produce no rows.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if discovery or the record query
    /// fails.
    pub fn compute(
        &self,
        code: &CollectionCode,
        facet: Facet,
        bounds: &CollectionBounds,
    ) -> Result<Vec<FacetAggregate>> {
        let values: BTreeSet<String> = self.discover(code, facet)?.into_iter().collect();
        if values.is_empty() {
            tracing::debug!(code = %code, facet = %facet, "No facet values discovered");
            return Ok(Vec::new());
        }

        let query = RecordQuery::all().with_range(bounds.range(Granularity::FINEST));
        let mut counts: BTreeMap<(_, &str), u64> = BTreeMap::new();
        self.store.for_each_matching(code, &query, &mut |record: RawRecord| {
            let (Some(ts), Some(value)) = (record.timestamp, record.facet(facet)) else {
                return;
            };
            if let Some(value) = values.get(value) {
                *counts
                    .entry((Granularity::FINEST.truncate(ts), value.as_str()))
                    .or_insert(0) += 1;
            }
        })?;

        let rows = counts
            .into_iter()
            .map(|((bucket, value), count)| FacetAggregate {
                code: code.clone(),
                facet,
                value: value.to_string(),
                bucket,
                count,
            })
            .collect();

        Ok(rows)
    }

    /// Recompute one facet, replace its stored rows, and mark the dimension
    /// done on `progress`.
    ///
    /// An empty value set still replaces the stored rows and sets the flag.
    /// Returns the number of rows written. The flag is left clear on error.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StoreUnavailable` if a query or the write fails.
    pub fn run(
        &self,
        code: &CollectionCode,
        facet: Facet,
        bounds: &CollectionBounds,
        progress: &RunProgress,
    ) -> Result<usize> {
        let rows = self.compute(code, facet, bounds)?;
        self.store.replace_facet_aggregates(code, facet, &rows)?;

        progress.mark_done(Dimension::from(facet));

        tracing::info!(
            code = %code,
            facet = %facet,
            rows = rows.len(),
            "Facet aggregated"
        );

        Ok(rows.len())
    }
}
