//! End-to-end loading runs
//!
//! A [`LoadingRunner`] performs one run of one loading:
//!
//! 1. resolve the source relation through the metadata provider
//! 2. build the key extractor (no key, no run)
//! 3. plan the watermark from prior metrics
//! 4. open old (warehouse copy) and new (source) cursors
//! 5. reconcile, per chunk when the loading is chunked
//! 6. hand exactly one outcome to the recorder
//!
//! The returned [`RunReport`] mirrors what was recorded.

use crate::error::{ReconcileError, Side};
use crate::key::KeyExtractor;
use crate::materializer::Materializer;
use crate::planner::IncrementalPlanner;
use crate::reconciler::{Reconciler, Reconciliation, Unmatched};
use crate::recorder::{RunOutcome, RunRecorder};
use dwhrecon_catalog::{CatalogAdapter, FetchError, RangePredicate, RowSource};
use dwhrecon_core::{
    ChunkBoundary, ChunkingStrategy, Config, Loading, LoadingMetric, ReconciliationResult,
    Relation, RowKey, RowSignature, RunReport, Value, Watermark,
};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::Bound;

/// Successful run, before it is recorded
struct Execution {
    result: ReconciliationResult,
    metrics: Vec<LoadingMetric>,
}

/// Runs loadings against a metadata provider, two row sources and a
/// recorder
pub struct LoadingRunner<'r> {
    catalog: &'r dyn CatalogAdapter,
    source: &'r dyn RowSource,
    mirror: &'r dyn RowSource,
    recorder: &'r dyn RunRecorder,
    config: Config,
}

impl<'r> LoadingRunner<'r> {
    /// `source` supplies the new rows, `mirror` the previously loaded ones
    pub fn new(
        catalog: &'r dyn CatalogAdapter,
        source: &'r dyn RowSource,
        mirror: &'r dyn RowSource,
        recorder: &'r dyn RunRecorder,
    ) -> Self {
        Self {
            catalog,
            source,
            mirror,
            recorder,
            config: Config::default(),
        }
    }

    /// Use metadata column patterns from `config`
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Run one loading
    ///
    /// Never returns an error: failures end up in the report and in the
    /// recorded outcome.
    pub async fn run(&self, loading: &Loading) -> RunReport {
        let report = RunReport::new(loading.name(), loading.strategy().kind());
        tracing::info!(
            loading = loading.name(),
            source = %loading.source(),
            catalog = self.catalog.name(),
            "starting run"
        );

        match self.catalog.fetch_relation(loading.source()).await {
            Ok(relation) => self.run_with_relation(loading, &relation),
            Err(source) => {
                let error = ReconcileError::Metadata {
                    relation: loading.source().fqn(),
                    source,
                };
                self.finish(loading, report, Err(error))
            }
        }
    }

    /// Run several loadings one after another
    pub async fn run_all(&self, loadings: &[Loading]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(loadings.len());
        for loading in loadings {
            reports.push(self.run(loading).await);
        }
        reports
    }

    /// Run one loading against an already resolved relation
    pub fn run_with_relation(&self, loading: &Loading, relation: &Relation) -> RunReport {
        let mut report = RunReport::new(loading.name(), loading.strategy().kind());
        let execution = self.execute(loading, relation, &mut report);
        self.finish(loading, report, execution)
    }

    fn finish(
        &self,
        loading: &Loading,
        report: RunReport,
        execution: Result<Execution, ReconcileError>,
    ) -> RunReport {
        match execution {
            Ok(Execution { result, metrics }) => {
                let summary = result.summary();
                match self.recorder.record(RunOutcome::completed(loading.name(), metrics)) {
                    Ok(()) => {
                        tracing::info!(
                            loading = loading.name(),
                            added = summary.added,
                            removed = summary.removed,
                            changed = summary.changed,
                            unchanged = summary.unchanged,
                            "run completed"
                        );
                        report.completed(result)
                    }
                    Err(e) => {
                        let error = ReconcileError::Record {
                            loading: loading.name().to_string(),
                            message: e.to_string(),
                        };
                        tracing::error!(loading = loading.name(), code = error.code(), "{}", error);
                        report.failed(error.code(), error.to_string())
                    }
                }
            }
            Err(error) => {
                tracing::error!(
                    loading = loading.name(),
                    code = error.code(),
                    "run failed: {}",
                    error
                );
                if let Err(e) = self
                    .recorder
                    .record(RunOutcome::failed(loading.name(), error.to_string()))
                {
                    tracing::warn!(loading = loading.name(), "failed to record failed run: {}", e);
                }
                report.failed(error.code(), error.to_string())
            }
        }
    }

    fn execute(
        &self,
        loading: &Loading,
        relation: &Relation,
        report: &mut RunReport,
    ) -> Result<Execution, ReconcileError> {
        let extractor = KeyExtractor::for_loading(relation, loading, &self.config)?;
        let mirror_relation = relation.mirrored_as(loading.destination().identifier()?);
        let planner = IncrementalPlanner::new(loading);
        let increment_column = loading.strategy().increment_column();

        let watermark = match increment_column {
            Some(_) => {
                let prior = self
                    .recorder
                    .metrics(loading.name())
                    .map_err(|e| ReconcileError::Record {
                        loading: loading.name().to_string(),
                        message: e.to_string(),
                    })?;
                planner.next_watermark(&prior)
            }
            None => None,
        };
        report.watermark = watermark;

        let mut new_side = Materializer::new(self.source, relation)?;
        let old_side = Materializer::new(self.mirror, &mirror_relation)?;
        let mut reconciler = Reconciler::new(&extractor);
        if let Some(column) = increment_column {
            reconciler = reconciler.tracking_increment(column);
        }
        // Only the new side is restricted: the warehouse copy still carries
        // the increment values of its last load
        if let (Some(column), Some(watermark)) = (increment_column, watermark) {
            tracing::info!(
                loading = loading.name(),
                column,
                %watermark,
                "extracting since watermark"
            );
            new_side =
                new_side.restricted_to(RangePredicate::at_least(column, watermark.to_value()));
            reconciler = reconciler.within_increment();
        }

        let passes = match loading.chunking() {
            Some(chunking) => {
                let boundaries = planner
                    .plan_chunks(&new_side)
                    .map_err(|e| read_error(relation, Side::New, e))?;
                reconcile_chunks(&reconciler, &old_side, &new_side, chunking, boundaries)?
            }
            None => Vec::new(),
        };

        let (result, run_metric, chunk_metrics) = if passes.is_empty() {
            let old = old_side
                .fetch_all()
                .map_err(|e| read_error(&mirror_relation, Side::Old, e))?;
            let new = new_side
                .fetch_all()
                .map_err(|e| read_error(relation, Side::New, e))?;
            let pass = reconciler.reconcile(old, new)?;
            let metric = metric_for(loading, &pass, pass.rows_set_hash.clone())?;
            (pass.result, metric, Vec::new())
        } else {
            combine(loading, &extractor, reconciler.classifies_old_only(), passes)?
        };

        report.records_count = run_metric.records_count();
        report.rows_set_hash = run_metric.rows_set_hash().map(str::to_string);
        report.chunks = chunk_metrics.len();

        let mut metrics = Vec::with_capacity(chunk_metrics.len() + 1);
        metrics.push(run_metric);
        metrics.extend(chunk_metrics);

        Ok(Execution { result, metrics })
    }
}

fn read_error(relation: &Relation, side: Side, source: FetchError) -> ReconcileError {
    ReconcileError::Source {
        relation: relation.identifier().fqn(),
        side,
        source,
    }
}

/// Reconcile chunk by chunk
///
/// Windows run from each chunk's left boundary up to (excluding) the next
/// one, the first unbounded below and the last unbounded above, so every
/// row of either side falls in exactly one window. Rows with a NULL
/// crushing value land in the first one.
fn reconcile_chunks(
    reconciler: &Reconciler<'_>,
    old_side: &Materializer<'_>,
    new_side: &Materializer<'_>,
    chunking: &ChunkingStrategy,
    boundaries: Vec<ChunkBoundary>,
) -> Result<Vec<WindowPass>, ReconcileError> {
    let column = chunking.crushing_column();
    let mut passes = Vec::with_capacity(boundaries.len());

    for (i, boundary) in boundaries.iter().enumerate() {
        let lower = if i == 0 {
            Bound::Unbounded
        } else {
            Bound::Included(boundary.left_boundary.clone())
        };
        let upper = match boundaries.get(i + 1) {
            Some(next) => Bound::Excluded(next.left_boundary.clone()),
            None => Bound::Unbounded,
        };
        let window = RangePredicate::new(column, lower, upper);
        tracing::debug!(
            chunk = i + 1,
            of = boundaries.len(),
            %boundary,
            %window,
            "reconciling chunk"
        );

        let old = old_side
            .fetch_range(Some(window.clone()))
            .map_err(|e| read_error(old_side.relation(), Side::Old, e))?;
        let new = new_side
            .fetch_range(Some(window))
            .map_err(|e| read_error(new_side.relation(), Side::New, e))?;
        let (pass, unmatched) = reconciler.reconcile_window(old, new)?;
        passes.push(WindowPass {
            boundary: boundary.clone(),
            pass,
            unmatched,
        });
    }

    Ok(passes)
}

struct WindowPass {
    boundary: ChunkBoundary,
    pass: Reconciliation,
    unmatched: Unmatched,
}

/// Fold per-chunk passes into one result, one run metric and chunk metrics
fn combine(
    loading: &Loading,
    extractor: &KeyExtractor,
    report_removed: bool,
    passes: Vec<WindowPass>,
) -> Result<(ReconciliationResult, LoadingMetric, Vec<LoadingMetric>), ReconcileError> {
    let mut merged = CrossChunkMerge::new(extractor.relation());
    let mut hasher = Sha256::new();
    let mut records_count = 0;
    let mut max_increment: Option<Value> = None;
    let mut chunk_metrics = Vec::with_capacity(passes.len());

    for WindowPass {
        boundary,
        pass,
        unmatched,
    } in passes
    {
        hasher.update(pass.rows_set_hash.as_bytes());
        records_count += pass.records_count;
        if let Some(value) = &pass.max_increment {
            let is_new_max = max_increment
                .as_ref()
                .map_or(true, |max| value.compare_loose(max) == Ordering::Greater);
            if is_new_max {
                max_increment = Some(value.clone());
            }
        }

        let metric = metric_for(loading, &pass, pass.rows_set_hash.clone())?;
        chunk_metrics.push(metric.with_chunk(boundary));
        merged.absorb(pass.result, unmatched)?;
    }

    let result = merged.finish(report_removed);

    let combined = Reconciliation {
        result: ReconciliationResult::new(),
        records_count,
        rows_set_hash: hex::encode(hasher.finalize()),
        max_increment,
    };
    let run_metric = metric_for(loading, &combined, combined.rows_set_hash.clone())?;

    Ok((result, run_metric, chunk_metrics))
}

fn metric_for(
    loading: &Loading,
    pass: &Reconciliation,
    rows_set_hash: String,
) -> Result<LoadingMetric, ReconcileError> {
    let increment = match (loading.strategy().increment_column(), &pass.max_increment) {
        (Some(_), Some(value)) => Watermark::from_value(value)?,
        _ => None,
    };

    let metric =
        LoadingMetric::new(loading.name(), pass.records_count).with_increment_value(increment);
    Ok(if loading.has_to_hash() {
        metric.with_rows_set_hash(rows_set_hash)
    } else {
        metric
    })
}

/// Classification of a chunked run across its windows
///
/// A key whose crushing value moved between chunks is unmatched in two
/// windows: once on the old side and once on the new side. Pairing those
/// at the end classifies it by signature like any other key. Every key may
/// appear once per side over the whole run.
struct CrossChunkMerge<'r> {
    relation: &'r str,
    seen_old: HashSet<RowKey>,
    seen_new: HashSet<RowKey>,
    old_only: HashMap<RowKey, RowSignature>,
    new_only: Vec<(RowKey, RowSignature)>,
    result: ReconciliationResult,
}

impl<'r> CrossChunkMerge<'r> {
    fn new(relation: &'r str) -> Self {
        Self {
            relation,
            seen_old: HashSet::new(),
            seen_new: HashSet::new(),
            old_only: HashMap::new(),
            new_only: Vec::new(),
            result: ReconciliationResult::new(),
        }
    }

    fn absorb(
        &mut self,
        result: ReconciliationResult,
        unmatched: Unmatched,
    ) -> Result<(), ReconcileError> {
        for key in result.changed.iter().chain(&result.unchanged) {
            self.see(Side::Old, key)?;
            self.see(Side::New, key)?;
        }
        for (key, signature) in unmatched.old {
            self.see(Side::Old, &key)?;
            self.old_only.insert(key, signature);
        }
        for (key, signature) in unmatched.new {
            self.see(Side::New, &key)?;
            self.new_only.push((key, signature));
        }
        self.result.merge(result);
        Ok(())
    }

    fn see(&mut self, side: Side, key: &RowKey) -> Result<(), ReconcileError> {
        let seen = match side {
            Side::Old => &mut self.seen_old,
            Side::New => &mut self.seen_new,
        };
        if seen.insert(key.clone()) {
            Ok(())
        } else {
            Err(ReconcileError::DuplicateKey {
                relation: self.relation.to_string(),
                side,
                key: key.clone(),
            })
        }
    }

    /// Pair keys left unmatched in their own windows; the rest are added
    /// or, when `report_removed`, removed
    fn finish(mut self, report_removed: bool) -> ReconciliationResult {
        let mut moved = 0;
        for (key, signature) in self.new_only {
            match self.old_only.remove(&key) {
                Some(old_signature) => {
                    moved += 1;
                    if old_signature == signature {
                        self.result.unchanged.push(key);
                    } else {
                        self.result.changed.push(key);
                    }
                }
                None => self.result.added.push(key),
            }
        }
        if moved > 0 {
            tracing::debug!(keys = moved, "keys moved between chunks");
        }
        if report_removed {
            self.result.removed.extend(self.old_only.into_keys());
        }

        let mut result = self.result;
        result.added.sort();
        result.removed.sort();
        result.changed.sort();
        result.unchanged.sort();

        debug_assert!(
            {
                let mut all: Vec<&RowKey> = result
                    .added
                    .iter()
                    .chain(&result.removed)
                    .chain(&result.changed)
                    .chain(&result.unchanged)
                    .collect();
                let total = all.len();
                all.sort();
                all.dedup();
                all.len() == total
            },
            "a key was classified twice"
        );
        result
    }
}
