//! Event source abstraction over an external indexer.

use crate::domain::{Address, EntityId, StreamSchema};
use async_trait::async_trait;
use std::fmt;

pub mod graphql;
pub mod mock;
pub mod normalize;

pub use graphql::GraphQlEventSource;
pub use mock::MockEventSource;
pub use normalize::{RowError, RowReader};

/// Transport for one indexer.
///
/// Implementations own pagination and retry/backoff. Rows come back raw and
/// unfiltered beyond `filter`; ordering and duplicates are not guaranteed.
#[async_trait]
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Fetch every row of one collection matching `filter`.
    ///
    /// # Arguments
    /// * `schema` - Collection, key fields and selection set
    /// * `filter` - Row filter applied by the indexer
    ///
    /// # Returns
    /// All matching rows across all pages, or an error if any page failed
    async fn fetch_rows(
        &self,
        schema: &StreamSchema,
        filter: &RowFilter,
    ) -> Result<Vec<serde_json::Value>, DataSourceError>;
}

/// Indexer-side row filter for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Restrict to these entity ids (`<entityField>_in`).
    pub entity_ids: Option<Vec<EntityId>>,
    /// Restrict to rows whose actor field equals this address.
    pub actor: Option<Address>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn entities(ids: Vec<EntityId>) -> Self {
        Self {
            entity_ids: Some(ids),
            actor: None,
        }
    }

    pub fn actor(actor: Address) -> Self {
        Self {
            entity_ids: None,
            actor: Some(actor),
        }
    }

    /// GraphQL `where` object for `schema`.
    pub fn to_where(&self, schema: &StreamSchema) -> serde_json::Value {
        let mut clause = serde_json::Map::new();
        if let Some(ids) = &self.entity_ids {
            clause.insert(
                format!("{}_in", schema.entity_field),
                serde_json::Value::Array(
                    ids.iter()
                        .map(|id| serde_json::Value::String(id.as_str().to_string()))
                        .collect(),
                ),
            );
        }
        if let (Some(actor), Some(field)) = (&self.actor, schema.actor_field) {
            clause.insert(
                field.to_string(),
                serde_json::Value::String(actor.as_str().to_string()),
            );
        }
        serde_json::Value::Object(clause)
    }
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or unexpected response shape)
    ParseError(String),
    /// The indexer answered with a GraphQL `errors` payload
    QueryError(String),
    /// Rate limit exceeded
    RateLimited,
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::QueryError(msg) => write!(f, "Query error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for DataSourceError {}
