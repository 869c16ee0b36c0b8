//! Event records observed from the indexer.

use crate::domain::model::{CreationRecord, EventKind};
use crate::domain::{Address, EntityId, RawAmount, TimeSec};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// How many events of one kind an entity may legitimately carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// At most one per entity (finalized, cancelled). Re-deliveries collapse
    /// onto the earliest record.
    Single,
    /// Many per entity (contributed, claimed). All distinct records are kept.
    Many,
}

/// One non-creation event, normalized from an indexer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord<K> {
    pub kind: K,
    pub entity_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<RawAmount>,
    /// `None` when the row's timestamp was missing or malformed. The event
    /// still counts for status and totals.
    pub timestamp: Option<TimeSec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Indexer row id (`txHash-logIndex`), unique per emitted log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
    /// Deduplication key, see [`compute_event_key`].
    pub event_key: String,
}

impl<K: EventKind> EventRecord<K> {
    pub fn new(
        kind: K,
        entity_id: EntityId,
        actor: Option<Address>,
        amount: Option<RawAmount>,
        timestamp: Option<TimeSec>,
        tx_hash: Option<String>,
    ) -> Self {
        let tx_hash = normalize_tx_hash(tx_hash);
        let event_key = compute_event_key(
            kind.as_str(),
            &entity_id,
            actor.as_ref(),
            timestamp,
            tx_hash.as_deref(),
            None,
            amount.as_ref(),
        );
        Self {
            kind,
            entity_id,
            actor,
            amount,
            timestamp,
            tx_hash,
            row_id: None,
            event_key,
        }
    }

    /// Attach the indexer row id and re-derive the key with it.
    pub fn with_row_id(mut self, row_id: Option<String>) -> Self {
        self.row_id = row_id
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());
        self.event_key = compute_event_key(
            self.kind.as_str(),
            &self.entity_id,
            self.actor.as_ref(),
            self.timestamp,
            self.tx_hash.as_deref(),
            self.row_id.as_deref(),
            self.amount.as_ref(),
        );
        self
    }

    /// Ordering used for storage inside an aggregate: oldest first, events
    /// without a timestamp last, key as tie-breaker, so the result never
    /// depends on delivery order.
    pub fn ordering_key(&self) -> (bool, TimeSec, &str) {
        (
            self.timestamp.is_none(),
            self.timestamp.unwrap_or_default(),
            self.event_key.as_str(),
        )
    }

    /// Total order over records: [`Self::ordering_key`], then payload.
    /// Records sharing a key but not a payload still sort the same way in
    /// every delivery order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.ordering_key()
            .cmp(&other.ordering_key())
            .then_with(|| self.amount.cmp(&other.amount))
            .then_with(|| self.actor.cmp(&other.actor))
            .then_with(|| self.tx_hash.cmp(&other.tx_hash))
            .then_with(|| self.row_id.cmp(&other.row_id))
    }
}

/// Stable identity of an event for deduplication.
///
/// With a transaction hash and an actor the natural key
/// `(kind, entityId, actor, timestamp, txHash, rowId)` is used (`tx:`
/// prefix). The row id tells apart several logs of one transaction.
/// Otherwise every field participates, so only byte-identical records
/// collapse (`eq:` prefix).
pub fn compute_event_key(
    kind: &str,
    entity_id: &EntityId,
    actor: Option<&Address>,
    timestamp: Option<TimeSec>,
    tx_hash: Option<&str>,
    row_id: Option<&str>,
    amount: Option<&RawAmount>,
) -> String {
    fn hash_var(hasher: &mut Sha256, data: &str) {
        hasher.update((data.len() as u32).to_le_bytes());
        hasher.update(data.as_bytes());
    }

    fn hash_opt(hasher: &mut Sha256, data: Option<&str>) {
        match data {
            Some(s) => {
                hasher.update([1u8]);
                hash_var(hasher, s);
            }
            None => hasher.update([0u8]),
        }
    }

    let mut hasher = Sha256::new();
    hash_var(&mut hasher, kind);
    hash_var(&mut hasher, entity_id.as_str());
    match timestamp {
        Some(ts) => {
            hasher.update([1u8]);
            hasher.update(ts.as_secs().to_le_bytes());
        }
        None => hasher.update([0u8]),
    }

    let prefix = match (tx_hash, actor) {
        (Some(tx), Some(actor)) => {
            hash_var(&mut hasher, actor.as_str());
            hash_var(&mut hasher, tx);
            hash_opt(&mut hasher, row_id);
            "tx"
        }
        _ => {
            hash_opt(&mut hasher, actor.map(|a| a.as_str()));
            hash_opt(&mut hasher, tx_hash);
            hash_opt(&mut hasher, row_id);
            hash_opt(&mut hasher, amount.map(|a| a.as_str()));
            "eq"
        }
    };

    let hash = hasher.finalize();
    format!("{}:{}", prefix, hex::encode(&hash[..16]))
}

fn normalize_tx_hash(tx_hash: Option<String>) -> Option<String> {
    tx_hash
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

/// A normalized row: the tagged union over one domain's event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent<C, K> {
    Created(C),
    Occurred(EventRecord<K>),
}

impl<C: CreationRecord, K: EventKind> DomainEvent<C, K> {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            DomainEvent::Created(created) => created.entity_id(),
            DomainEvent::Occurred(record) => &record.entity_id,
        }
    }

    pub fn timestamp(&self) -> Option<TimeSec> {
        match self {
            DomainEvent::Created(created) => created.created_at(),
            DomainEvent::Occurred(record) => record.timestamp,
        }
    }
}
