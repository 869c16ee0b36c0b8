//! The per-domain contract: event vocabulary, status vocabulary, canonical
//! precedence table and wire schema.
//!
//! Each entity domain (bounties, study funds) is one zero-sized type
//! implementing [`Domain`]. The aggregator, resolver, calculator and fetcher
//! are written once against this trait.

use crate::datasource::normalize::RowError;
use crate::domain::{
    Address, Amount, EntityAggregate, EntityId, Metric, Multiplicity, RawAmount, TimeSec,
};
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Tag of one non-creation event kind.
pub trait EventKind:
    Copy + Eq + Ord + Hash + Debug + Display + Serialize + Send + Sync + 'static
{
    /// Wire/report name, e.g. `"claimed"`.
    fn as_str(&self) -> &'static str;
}

/// Label produced by the status resolver.
pub trait StatusLabel: Copy + Eq + Hash + Debug + Display + Serialize + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;
}

/// The static attributes an entity is created with.
pub trait CreationRecord: Clone + PartialEq + Debug + Serialize + Send + Sync + 'static {
    fn entity_id(&self) -> &EntityId;
    fn owner(&self) -> &Address;
    /// `None` when the deadline was missing or malformed upstream; such an
    /// entity never expires by time.
    fn deadline(&self) -> Option<TimeSec>;
    /// `None` when the creation row's timestamp was missing or malformed.
    fn created_at(&self) -> Option<TimeSec>;
    fn event_key(&self) -> &str;
}

/// Where one event stream lives in the indexer and how its rows are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSchema {
    /// GraphQL collection name, e.g. `bountyClaimeds`.
    pub collection: &'static str,
    /// Field carrying the entity id.
    pub entity_field: &'static str,
    /// Actor (or owner, for creation streams) address field.
    pub actor_field: Option<&'static str>,
    /// Amount field summed into totals, where the kind has one.
    pub amount_field: Option<&'static str>,
    pub timestamp_field: &'static str,
    pub tx_field: &'static str,
    /// Indexer row id, unique per emitted log.
    pub id_field: &'static str,
    /// Full selection set requested for this collection.
    pub fields: &'static [&'static str],
}

/// Predicate of one precedence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition<K> {
    /// At least one event of this kind is present.
    Has(K),
    /// `now` is strictly after the creation record's deadline.
    PastDeadline,
}

/// One row of a precedence table: first matching row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule<K, S> {
    pub when: Condition<K>,
    pub status: S,
}

impl<K, S> Rule<K, S> {
    pub const fn new(when: Condition<K>, status: S) -> Self {
        Self { when, status }
    }
}

/// One entity domain.
pub trait Domain: Send + Sync + 'static {
    /// Domain name used in logs, reports and errors.
    const NAME: &'static str;

    type Kind: EventKind;
    type Created: CreationRecord;
    type Status: StatusLabel;

    /// Name of the creation kind, e.g. `"posted"`.
    const CREATED_KIND: &'static str;
    /// Creation stream.
    const CREATED: StreamSchema;
    /// Every non-creation kind; each is fetched as its own stream.
    const KINDS: &'static [Self::Kind];

    /// Canonical precedence, evaluated top to bottom.
    const PRECEDENCE: &'static [Rule<Self::Kind, Self::Status>];
    /// Status when no rule matches.
    const INITIAL: Self::Status;
    /// Groups of kinds that must never co-occur on one entity.
    const EXCLUSIVE_TERMINALS: &'static [&'static [Self::Kind]];

    /// Kind whose amounts count towards [`Domain::progress_target`].
    const PROGRESS_KIND: Option<Self::Kind> = None;

    fn schema(kind: Self::Kind) -> &'static StreamSchema;

    fn multiplicity(kind: Self::Kind) -> Multiplicity;

    /// Normalize one creation row.
    fn parse_created(row: &serde_json::Value) -> Result<Self::Created, RowError>;

    fn progress_target(_created: &Self::Created) -> Option<&RawAmount> {
        None
    }

    /// Amount a participant must approve before acting on the entity.
    fn required_amount(_created: &Self::Created) -> Option<&RawAmount> {
        None
    }

    /// Value still locked in the entity by participants, where the domain
    /// has such a notion.
    fn outstanding(
        _aggregate: &EntityAggregate<Self::Created, Self::Kind>,
    ) -> Option<Metric<Amount>> {
        None
    }
}

/// Aggregate type of a domain.
pub type AggregateOf<D> = EntityAggregate<<D as Domain>::Created, <D as Domain>::Kind>;
