//! Recompute contract: every projection is built from scratch out of the
//! full current streams and an explicit evaluation instant.

use crate::domain::{Domain, EntityAggregate, EntityId, Orphan, TimeSec};
use crate::engine::{
    aggregate, metrics, resolve, AggregationError, AllowanceSnapshot, Anomaly, DerivedMetrics,
    StreamsOf,
};
use crate::orchestration::fetch::{EventFetcher, EventFilter, FetchError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Status and metrics of one entity at one instant, plus its raw aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection<C, K: Ord, S> {
    pub entity_id: EntityId,
    pub status: S,
    /// Index of the precedence rule that produced `status`.
    pub matched_rule: Option<usize>,
    pub metrics: DerivedMetrics<K>,
    pub anomalies: Vec<Anomaly>,
    pub aggregate: EntityAggregate<C, K>,
}

pub type ProjectionOf<D> =
    Projection<<D as Domain>::Created, <D as Domain>::Kind, <D as Domain>::Status>;

/// Data-quality counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionReport {
    pub entity_count: usize,
    pub orphans: Vec<Orphan>,
    pub orphan_count: usize,
    pub duplicates_dropped: usize,
    pub conflicting_duplicates: usize,
    pub rows_rejected: usize,
    /// Events kept without a usable timestamp; they sort last in timelines.
    pub rows_untimed: usize,
    pub ambiguous_terminal_states: usize,
    pub unavailable_metrics: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionBatch<C, K: Ord, S> {
    pub domain: &'static str,
    pub evaluated_at: TimeSec,
    /// Ordered by entity id.
    pub projections: Vec<Projection<C, K, S>>,
    pub report: ProjectionReport,
}

pub type BatchOf<D> =
    ProjectionBatch<<D as Domain>::Created, <D as Domain>::Kind, <D as Domain>::Status>;

impl<C, K: Ord, S> ProjectionBatch<C, K, S> {
    pub fn find(&self, entity_id: &EntityId) -> Option<&Projection<C, K, S>> {
        self.projections
            .binary_search_by(|p| p.entity_id.cmp(entity_id))
            .ok()
            .map(|index| &self.projections[index])
    }

    pub fn find_orphan(&self, entity_id: &EntityId) -> Option<&Orphan> {
        self.report.orphans.iter().find(|o| &o.entity_id == entity_id)
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Project every entity in `streams` at `now`.
///
/// Pure: identical streams and `now` give identical batches regardless of
/// record order.
pub fn project_streams<D: Domain>(
    streams: &StreamsOf<D>,
    now: TimeSec,
    snapshot: &AllowanceSnapshot,
) -> Result<BatchOf<D>, AggregationError> {
    let aggregation = aggregate::<D>(streams)?;

    let mut report = ProjectionReport {
        entity_count: aggregation.aggregates.len(),
        orphan_count: aggregation.orphans.len(),
        orphans: aggregation.orphans,
        duplicates_dropped: aggregation.duplicates_dropped,
        conflicting_duplicates: aggregation.conflicting_duplicates,
        rows_rejected: streams.rows_rejected,
        rows_untimed: streams.rows_untimed,
        ..Default::default()
    };

    let projections: Vec<ProjectionOf<D>> = aggregation
        .aggregates
        .into_iter()
        .map(|(entity_id, aggregate)| {
            let resolution = resolve::<D>(&aggregate, now);
            let metrics = metrics::compute::<D>(&aggregate, now, snapshot);
            report.ambiguous_terminal_states += resolution.anomalies.len();
            report.unavailable_metrics += metrics.unavailable_count();
            Projection {
                entity_id,
                status: resolution.status,
                matched_rule: resolution.matched_rule,
                metrics,
                anomalies: resolution.anomalies,
                aggregate,
            }
        })
        .collect();

    Ok(ProjectionBatch {
        domain: D::NAME,
        evaluated_at: now,
        projections,
        report,
    })
}

/// Fetches a domain and projects it. Holds no projection state between calls.
#[derive(Debug, Clone)]
pub struct Projector {
    fetcher: EventFetcher,
}

impl Projector {
    pub fn new(fetcher: EventFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch all streams of `D` for `filter`, then project them.
    ///
    /// Without an explicit `now` the clock is read after the fetch joins, so
    /// time-dependent fields reflect the evaluation instant.
    pub async fn project<D: Domain>(
        &self,
        filter: &EventFilter,
        snapshot: &AllowanceSnapshot,
        now: Option<TimeSec>,
    ) -> Result<BatchOf<D>, ProjectionError> {
        let streams = self.fetcher.fetch::<D>(filter).await?;
        let now = now.unwrap_or_else(TimeSec::now);
        let batch = project_streams::<D>(&streams, now, snapshot)?;

        info!(
            domain = D::NAME,
            evaluated_at = %now,
            entities = batch.report.entity_count,
            orphans = batch.report.orphan_count,
            duplicates_dropped = batch.report.duplicates_dropped,
            rows_rejected = batch.report.rows_rejected,
            rows_untimed = batch.report.rows_untimed,
            ambiguous = batch.report.ambiguous_terminal_states,
            unavailable_metrics = batch.report.unavailable_metrics,
            "projection complete"
        );
        Ok(batch)
    }
}
