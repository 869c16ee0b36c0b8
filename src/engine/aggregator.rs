//! Entity aggregator: groups normalized streams by entity id.

use crate::domain::{
    CreationRecord, Domain, DomainEvent, EntityAggregate, EntityId, EventKind, EventRecord,
    Multiplicity, Orphan, TimeSec,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::warn;

/// Normalized output of one complete domain fetch.
///
/// `streams` holds an entry for every registered kind, empty or not.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStreams<C, K> {
    pub created: Vec<C>,
    pub streams: BTreeMap<K, Vec<EventRecord<K>>>,
    /// Rows that could not be attributed to an entity.
    pub rows_rejected: usize,
    /// Rows kept without a usable timestamp.
    pub rows_untimed: usize,
}

impl<C, K: Ord + Copy> EventStreams<C, K> {
    /// Streams with every kind present and empty.
    pub fn empty(kinds: &[K]) -> Self {
        Self {
            created: Vec::new(),
            streams: kinds.iter().map(|k| (*k, Vec::new())).collect(),
            rows_rejected: 0,
            rows_untimed: 0,
        }
    }

    /// File one normalized row under its stream.
    pub fn push(&mut self, event: DomainEvent<C, K>) {
        match event {
            DomainEvent::Created(created) => self.created.push(created),
            DomainEvent::Occurred(record) => {
                self.streams.entry(record.kind).or_default().push(record)
            }
        }
    }
}

pub type StreamsOf<D> = EventStreams<<D as Domain>::Created, <D as Domain>::Kind>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    /// A registered kind has no stream at all. Aggregating without it could
    /// resolve a wrong terminal state.
    #[error("{domain}: stream for kind '{kind}' is missing")]
    IncompleteStreams {
        domain: &'static str,
        kind: &'static str,
    },
}

/// Every aggregate of one domain, keyed by entity id.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation<C, K> {
    pub aggregates: BTreeMap<EntityId, EntityAggregate<C, K>>,
    /// Ids referenced only by non-creation events, ordered by id.
    pub orphans: Vec<Orphan>,
    /// Re-deliveries collapsed onto an already-seen record.
    pub duplicates_dropped: usize,
    /// Distinct records for a single-occurrence slot, or differing payloads
    /// under one event key. Only the first in canonical order is kept.
    pub conflicting_duplicates: usize,
}

pub type AggregationOf<D> = Aggregation<<D as Domain>::Created, <D as Domain>::Kind>;

/// Build every aggregate of domain `D` from its streams.
///
/// The result depends only on the set of input records, never on their
/// delivery order.
pub fn aggregate<D: Domain>(streams: &StreamsOf<D>) -> Result<AggregationOf<D>, AggregationError> {
    if let Some(kind) = D::KINDS.iter().find(|k| !streams.streams.contains_key(*k)) {
        return Err(AggregationError::IncompleteStreams {
            domain: D::NAME,
            kind: kind.as_str(),
        });
    }

    let mut out = Aggregation {
        aggregates: BTreeMap::new(),
        orphans: Vec::new(),
        duplicates_dropped: 0,
        conflicting_duplicates: 0,
    };

    collect_created::<D>(&streams.created, &mut out);

    let mut orphans: BTreeMap<EntityId, (BTreeSet<&'static str>, usize)> = BTreeMap::new();
    for kind in D::KINDS {
        let records = dedup_records::<D>(
            streams.streams.get(kind).map(Vec::as_slice).unwrap_or_default(),
            &mut out,
        );

        for record in records {
            let Some(agg) = out.aggregates.get_mut(&record.entity_id) else {
                let entry = orphans.entry(record.entity_id.clone()).or_default();
                entry.0.insert(kind.as_str());
                entry.1 += 1;
                continue;
            };
            let slot = agg.events.entry(*kind).or_default();
            match D::multiplicity(*kind) {
                Multiplicity::Many => slot.push(record.clone()),
                Multiplicity::Single if slot.is_empty() => slot.push(record.clone()),
                Multiplicity::Single => {
                    warn!(
                        domain = D::NAME,
                        entity_id = %record.entity_id,
                        kind = kind.as_str(),
                        kept = %slot[0].event_key,
                        dropped = %record.event_key,
                        "conflicting single-occurrence event"
                    );
                    out.conflicting_duplicates += 1;
                }
            }
        }
    }

    out.orphans = orphans
        .into_iter()
        .map(|(entity_id, (kinds, event_count))| {
            warn!(
                domain = D::NAME,
                entity_id = %entity_id,
                event_count,
                "orphaned entity: events without a creation record"
            );
            Orphan {
                entity_id,
                kinds: kinds.into_iter().collect(),
                event_count,
            }
        })
        .collect();

    Ok(out)
}

/// Canonically ordered records of one stream with re-deliveries removed.
///
/// Records sharing an event key collapse onto the first in canonical
/// order. Identical payloads count as duplicates, differing payloads as
/// conflicts.
fn dedup_records<'a, D: Domain>(
    records: &'a [EventRecord<D::Kind>],
    out: &mut AggregationOf<D>,
) -> Vec<&'a EventRecord<D::Kind>> {
    let mut sorted: Vec<&EventRecord<D::Kind>> = records.iter().collect();
    sorted.sort_by(|a, b| a.canonical_cmp(b));

    let mut kept: Vec<&EventRecord<D::Kind>> = Vec::with_capacity(sorted.len());
    for record in sorted {
        match kept.last() {
            Some(last) if last.event_key == record.event_key => {
                if *last == record {
                    out.duplicates_dropped += 1;
                } else {
                    warn!(
                        domain = D::NAME,
                        entity_id = %record.entity_id,
                        kind = record.kind.as_str(),
                        event_key = %record.event_key,
                        "conflicting payloads under one event key"
                    );
                    out.conflicting_duplicates += 1;
                }
            }
            _ => kept.push(record),
        }
    }
    kept
}

/// Creation records are single-occurrence: the earliest by
/// `(created_at, event_key)` wins, records without a timestamp last. Ties
/// are broken by the serialized payload.
fn collect_created<D: Domain>(created: &[D::Created], out: &mut AggregationOf<D>) {
    let mut sorted: Vec<(bool, TimeSec, &str, Vec<u8>, &D::Created)> = created
        .iter()
        .map(|record| {
            (
                record.created_at().is_none(),
                record.created_at().unwrap_or_default(),
                record.event_key(),
                serde_json::to_vec(record).unwrap_or_default(),
                record,
            )
        })
        .collect();
    sorted.sort_by(|a, b| (a.0, a.1, a.2, &a.3).cmp(&(b.0, b.1, b.2, &b.3)));

    for (_, _, _, _, record) in sorted {
        match out.aggregates.get(record.entity_id()) {
            None => {
                out.aggregates.insert(
                    record.entity_id().clone(),
                    EntityAggregate::new(record.clone(), D::KINDS),
                );
            }
            Some(existing) if existing.created == *record => {
                out.duplicates_dropped += 1;
            }
            Some(existing) => {
                warn!(
                    domain = D::NAME,
                    entity_id = %record.entity_id(),
                    kind = D::CREATED_KIND,
                    kept = %existing.created.event_key(),
                    dropped = %record.event_key(),
                    "conflicting creation record"
                );
                out.conflicting_duplicates += 1;
            }
        }
    }
}
