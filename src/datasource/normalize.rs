//! Normalization of indexer JSON rows into domain values.
//!
//! GraphQL BigInt/BigDecimal scalars arrive as JSON strings; ids and
//! timestamps are also accepted as JSON numbers.

use crate::domain::{Address, EntityId, EventKind, EventRecord, RawAmount, StreamSchema, TimeSec};
use serde_json::Value;
use thiserror::Error;

/// A row that cannot be attributed to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row is not a JSON object")]
    NotAnObject,
    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Field accessors over one row object.
#[derive(Debug, Clone, Copy)]
pub struct RowReader<'a> {
    row: &'a serde_json::Map<String, Value>,
}

impl<'a> RowReader<'a> {
    pub fn new(row: &'a Value) -> Result<Self, RowError> {
        row.as_object()
            .map(|row| Self { row })
            .ok_or(RowError::NotAnObject)
    }

    /// Scalar field as text. Numbers and booleans are rendered, null is absent.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.row.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn required_text(&self, field: &'static str) -> Result<String, RowError> {
        self.text(field)
            .filter(|s| !s.trim().is_empty())
            .ok_or(RowError::MissingField(field))
    }

    pub fn entity_id(&self, field: &'static str) -> Result<EntityId, RowError> {
        self.required_text(field).map(EntityId::new)
    }

    pub fn address(&self, field: &str) -> Option<Address> {
        self.text(field)
            .filter(|s| !s.trim().is_empty())
            .map(Address::new)
    }

    pub fn amount(&self, field: &str) -> Option<RawAmount> {
        self.text(field).map(RawAmount::new)
    }

    /// Timestamp in Unix seconds: absent and malformed both read as `None`.
    pub fn optional_timestamp(&self, field: &str) -> Option<TimeSec> {
        self.text(field)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(TimeSec::new)
    }

    pub fn optional_u32(&self, field: &str) -> Option<u32> {
        self.text(field).and_then(|s| s.trim().parse::<u32>().ok())
    }
}

/// Normalize one row of a non-creation stream.
///
/// Only the entity id is required: a row naming its entity always counts
/// towards that entity's status. A missing or malformed timestamp becomes
/// `None`, and amounts are kept verbatim even when malformed.
pub fn event_from_row<K: EventKind>(
    kind: K,
    schema: &StreamSchema,
    row: &Value,
) -> Result<EventRecord<K>, RowError> {
    let reader = RowReader::new(row)?;
    let entity_id = reader.entity_id(schema.entity_field)?;
    let timestamp = reader.optional_timestamp(schema.timestamp_field);
    let actor = schema.actor_field.and_then(|f| reader.address(f));
    let amount = schema.amount_field.and_then(|f| reader.amount(f));
    let tx_hash = reader.text(schema.tx_field);

    Ok(
        EventRecord::new(kind, entity_id, actor, amount, timestamp, tx_hash)
            .with_row_id(reader.text(schema.id_field)),
    )
}
