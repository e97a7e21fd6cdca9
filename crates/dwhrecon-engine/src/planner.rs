//! Watermark and chunk planning for incremental loadings

use crate::materializer::Materializer;
use dwhrecon_catalog::FetchError;
use dwhrecon_core::{ChunkBoundary, Loading, LoadingMetric, LoadingStrategy, Watermark};

/// Watermark to extract from, given the metrics of prior successful runs
///
/// Takes the largest recorded increment value. With `is_overlapping` the
/// result steps back one unit so the boundary rows are read again. `None`
/// when no prior run recorded an increment value, meaning extract
/// everything.
pub fn next_watermark(prior_metrics: &[LoadingMetric], is_overlapping: bool) -> Option<Watermark> {
    let max = prior_metrics
        .iter()
        .filter_map(LoadingMetric::increment_value)
        .max()?;

    if is_overlapping {
        Some(max.step_back())
    } else {
        Some(max)
    }
}

/// Boundaries of every chunk of a chunked extraction
pub fn plan_chunks(
    materializer: &Materializer<'_>,
    crushing_column: &str,
    chunk_size: usize,
) -> Result<Vec<ChunkBoundary>, FetchError> {
    let bounds: Vec<ChunkBoundary> = materializer
        .fetch_chunk_bounds(crushing_column, chunk_size)?
        .collect::<Result<_, _>>()?;

    tracing::debug!(
        relation = %materializer.relation().identifier(),
        column = crushing_column,
        chunk_size,
        chunks = bounds.len(),
        "planned chunks"
    );
    Ok(bounds)
}

/// Planning for one loading
pub struct IncrementalPlanner<'l> {
    loading: &'l Loading,
}

impl<'l> IncrementalPlanner<'l> {
    pub fn new(loading: &'l Loading) -> Self {
        Self { loading }
    }

    /// Next watermark of the loading
    ///
    /// Snapshot loadings never have one. Metrics of other loadings are
    /// ignored.
    pub fn next_watermark(&self, prior_metrics: &[LoadingMetric]) -> Option<Watermark> {
        let is_overlapping = match self.loading.strategy() {
            LoadingStrategy::Snapshot => return None,
            LoadingStrategy::Incremental { is_overlapping, .. } => *is_overlapping,
        };

        let own: Vec<LoadingMetric> = prior_metrics
            .iter()
            .filter(|m| m.loading() == self.loading.name())
            .cloned()
            .collect();

        let watermark = next_watermark(&own, is_overlapping);
        tracing::debug!(
            loading = self.loading.name(),
            prior_runs = own.len(),
            watermark = ?watermark,
            is_overlapping,
            "planned watermark"
        );
        watermark
    }

    /// Chunk boundaries of the loading, empty when it is not chunked
    pub fn plan_chunks(
        &self,
        materializer: &Materializer<'_>,
    ) -> Result<Vec<ChunkBoundary>, FetchError> {
        match self.loading.chunking() {
            Some(chunking) => plan_chunks(
                materializer,
                chunking.crushing_column(),
                chunking.chunk_size(),
            ),
            None => Ok(Vec::new()),
        }
    }

    /// Chunk metrics to persist for planned boundaries, before any row is
    /// counted
    pub fn chunk_metrics(&self, boundaries: &[ChunkBoundary]) -> Vec<LoadingMetric> {
        boundaries
            .iter()
            .map(|b| LoadingMetric::new(self.loading.name(), 0).with_chunk(b.clone()))
            .collect()
    }
}
