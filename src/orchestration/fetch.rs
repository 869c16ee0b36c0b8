//! Fan-out/fan-in fetch of every event stream of one domain.

use crate::datasource::{normalize, DataSourceError, EventSource, RowError, RowFilter};
use crate::domain::{Address, CreationRecord, Domain, DomainEvent, EntityId, StreamSchema};
use crate::engine::{EventStreams, StreamsOf};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Which entities a projection covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Entity(EntityId),
    /// Entities created by this address ("my items" views).
    Owner(Address),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{domain} source unavailable: {collection} failed: {source}")]
    SourceUnavailable {
        domain: &'static str,
        collection: &'static str,
        #[source]
        source: DataSourceError,
    },
    #[error("{domain} fetch timed out after {after_ms}ms")]
    Timeout { domain: &'static str, after_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
enum Job<K> {
    Created,
    Kind(K),
}

/// Issues one fetch per stream with bounded concurrency and joins them all
/// before anything is aggregated. Any failure fails the whole domain.
#[derive(Debug, Clone)]
pub struct EventFetcher {
    source: Arc<dyn EventSource>,
    max_concurrency: usize,
    timeout: Duration,
}

impl EventFetcher {
    pub fn new(source: Arc<dyn EventSource>, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            source,
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    /// Fetch and normalize every stream of domain `D` for `filter`.
    ///
    /// # Errors
    /// `SourceUnavailable` if any stream fails, `Timeout` if the whole fetch
    /// exceeds the configured timeout. No partial result is ever returned.
    pub async fn fetch<D: Domain>(&self, filter: &EventFilter) -> Result<StreamsOf<D>, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetch_all::<D>(filter)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                domain: D::NAME,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn fetch_all<D: Domain>(&self, filter: &EventFilter) -> Result<StreamsOf<D>, FetchError> {
        let mut out = EventStreams::empty(D::KINDS);
        let kinds = || D::KINDS.iter().copied().map(Job::Kind);

        let results = match filter {
            EventFilter::All => {
                self.run_jobs::<D>(std::iter::once(Job::Created).chain(kinds()), &RowFilter::all())
                    .await?
            }
            EventFilter::Entity(id) => {
                let row_filter = RowFilter::entities(vec![id.clone()]);
                self.run_jobs::<D>(std::iter::once(Job::Created).chain(kinds()), &row_filter)
                    .await?
            }
            EventFilter::Owner(owner) => {
                // Creation records first; other streams are then fetched by
                // entity id, never by actor.
                let created = self
                    .run_jobs::<D>(std::iter::once(Job::Created), &RowFilter::actor(owner.clone()))
                    .await?;
                normalize_into::<D>(&mut out, created);

                let mut ids: Vec<EntityId> =
                    out.created.iter().map(|c| c.entity_id().clone()).collect();
                ids.sort();
                ids.dedup();
                if ids.is_empty() {
                    debug!(domain = D::NAME, owner = %owner, "owner has no entities");
                    return Ok(out);
                }

                self.run_jobs::<D>(kinds(), &RowFilter::entities(ids)).await?
            }
        };

        normalize_into::<D>(&mut out, results);
        Ok(out)
    }

    async fn run_jobs<D: Domain>(
        &self,
        jobs: impl Iterator<Item = Job<D::Kind>>,
        filter: &RowFilter,
    ) -> Result<Vec<(Job<D::Kind>, Vec<serde_json::Value>)>, FetchError> {
        let source = self.source.as_ref();
        stream::iter(jobs)
            .map(|job| async move {
                let schema: StreamSchema = match job {
                    Job::Created => D::CREATED,
                    Job::Kind(kind) => *D::schema(kind),
                };
                let rows = source.fetch_rows(&schema, filter).await.map_err(|source| {
                    warn!(
                        domain = D::NAME,
                        collection = schema.collection,
                        error = %source,
                        "stream fetch failed"
                    );
                    FetchError::SourceUnavailable {
                        domain: D::NAME,
                        collection: schema.collection,
                        source,
                    }
                })?;
                debug!(
                    domain = D::NAME,
                    collection = schema.collection,
                    rows = rows.len(),
                    "stream fetched"
                );
                Ok::<_, FetchError>((job, rows))
            })
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await
    }
}

fn normalize_into<D: Domain>(
    out: &mut StreamsOf<D>,
    results: Vec<(Job<D::Kind>, Vec<serde_json::Value>)>,
) {
    for (job, rows) in results {
        let collection = match job {
            Job::Created => D::CREATED.collection,
            Job::Kind(kind) => D::schema(kind).collection,
        };
        for row in &rows {
            match normalize_row::<D>(job, row) {
                Ok(event) => {
                    if event.timestamp().is_none() {
                        warn!(
                            domain = D::NAME,
                            collection,
                            entity_id = %event.entity_id(),
                            "row has no usable timestamp"
                        );
                        out.rows_untimed += 1;
                    }
                    out.push(event);
                }
                Err(e) => {
                    warn!(
                        domain = D::NAME,
                        collection,
                        error = %e,
                        "rejected row"
                    );
                    out.rows_rejected += 1;
                }
            }
        }
    }
}

fn normalize_row<D: Domain>(
    job: Job<D::Kind>,
    row: &serde_json::Value,
) -> Result<DomainEvent<D::Created, D::Kind>, RowError> {
    match job {
        Job::Created => D::parse_created(row).map(DomainEvent::Created),
        Job::Kind(kind) => {
            normalize::event_from_row(kind, D::schema(kind), row).map(DomainEvent::Occurred)
        }
    }
}
