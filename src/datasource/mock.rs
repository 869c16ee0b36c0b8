//! Mock event source for testing without network calls.

use super::{DataSourceError, EventSource, RowFilter};
use crate::datasource::normalize::RowReader;
use crate::domain::StreamSchema;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock source that serves predefined rows per collection.
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    rows: HashMap<String, Vec<serde_json::Value>>,
    failing: HashSet<String>,
    requests: Arc<Mutex<Vec<(String, RowFilter)>>>,
}

impl MockEventSource {
    /// Create a new mock with no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row to a collection.
    pub fn with_row(mut self, collection: &str, row: serde_json::Value) -> Self {
        self.rows.entry(collection.to_string()).or_default().push(row);
        self
    }

    /// Add multiple rows to a collection.
    pub fn with_rows(mut self, collection: &str, rows: Vec<serde_json::Value>) -> Self {
        self.rows
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
        self
    }

    /// Make every fetch of `collection` fail.
    pub fn failing(mut self, collection: &str) -> Self {
        self.failing.insert(collection.to_string());
        self
    }

    /// Collections and filters requested so far, in call order.
    pub fn requests(&self) -> Vec<(String, RowFilter)> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn fetch_rows(
        &self,
        schema: &StreamSchema,
        filter: &RowFilter,
    ) -> Result<Vec<serde_json::Value>, DataSourceError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push((schema.collection.to_string(), filter.clone()));
        }

        if self.failing.contains(schema.collection) {
            return Err(DataSourceError::HttpError {
                status: 503,
                message: format!("{} unavailable", schema.collection),
            });
        }

        let rows = self
            .rows
            .get(schema.collection)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        Ok(rows
            .iter()
            .filter(|row| matches_filter(row, schema, filter))
            .cloned()
            .collect())
    }
}

fn matches_filter(row: &serde_json::Value, schema: &StreamSchema, filter: &RowFilter) -> bool {
    let Ok(reader) = RowReader::new(row) else {
        // Malformed rows pass through so normalization sees them.
        return true;
    };

    if let Some(ids) = &filter.entity_ids {
        let id = reader.text(schema.entity_field).unwrap_or_default();
        if !ids.iter().any(|wanted| wanted.as_str() == id.trim()) {
            return false;
        }
    }

    if let (Some(actor), Some(field)) = (&filter.actor, schema.actor_field) {
        if reader.address(field).as_ref() != Some(actor) {
            return false;
        }
    }

    true
}
