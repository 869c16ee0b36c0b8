//! GraphQL indexer client (The Graph style subgraph endpoint).

use super::{DataSourceError, EventSource, RowFilter};
use crate::domain::StreamSchema;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Event source backed by a GraphQL indexing endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlEventSource {
    client: Client,
    endpoint: String,
    page_size: usize,
    retry_max_elapsed: Duration,
}

impl GraphQlEventSource {
    pub fn new(endpoint: String, page_size: usize, retry_max_elapsed: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            page_size: page_size.max(1),
            retry_max_elapsed,
        }
    }

    async fn post_query(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            classify_status(response.status())?;

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl EventSource for GraphQlEventSource {
    async fn fetch_rows(
        &self,
        schema: &StreamSchema,
        filter: &RowFilter,
    ) -> Result<Vec<serde_json::Value>, DataSourceError> {
        let query = build_query(schema);
        let where_clause = filter.to_where(schema);
        let mut rows = Vec::new();
        let mut skip = 0usize;

        loop {
            debug!(
                "Fetching page collection={}, skip={}, first={}",
                schema.collection, skip, self.page_size
            );

            let payload = serde_json::json!({
                "query": query,
                "variables": {
                    "first": self.page_size,
                    "skip": skip,
                    "where": where_clause,
                }
            });

            let response = self.post_query(payload).await?;
            let page = extract_page(&response, schema.collection)?;
            let page_len = page.len();
            rows.extend(page);

            match next_skip(skip, page_len, self.page_size) {
                Some(next) => skip = next,
                None => break,
            }
        }

        Ok(rows)
    }
}

/// Offset of the next page, or `None` once a short page marks the end.
///
/// A full page is always followed by another request, so a stream whose
/// length is an exact multiple of the page size ends on an empty page.
fn next_skip(skip: usize, page_len: usize, page_size: usize) -> Option<usize> {
    (page_len >= page_size).then_some(skip + page_len)
}

/// Rate limits and server errors are retried; any other failure is final.
fn classify_status(status: StatusCode) -> Result<(), backoff::Error<DataSourceError>> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(backoff::Error::transient(DataSourceError::RateLimited));
    }
    if status.is_server_error() {
        return Err(backoff::Error::transient(DataSourceError::HttpError {
            status: status.as_u16(),
            message: "Server error".to_string(),
        }));
    }
    if !status.is_success() {
        return Err(backoff::Error::permanent(DataSourceError::HttpError {
            status: status.as_u16(),
            message: "Client error".to_string(),
        }));
    }
    Ok(())
}

/// Paginated query for one collection, newest first.
fn build_query(schema: &StreamSchema) -> String {
    format!(
        "query Stream($first: Int!, $skip: Int!, $where: {filter}) {{ {collection}(first: $first, skip: $skip, where: $where, orderBy: {ts}, orderDirection: desc) {{ {fields} }} }}",
        filter = filter_type(schema.collection),
        collection = schema.collection,
        ts = schema.timestamp_field,
        fields = schema.fields.join(" "),
    )
}

/// `bountyClaimeds` -> `BountyClaimed_filter`.
fn filter_type(collection: &str) -> String {
    let singular = collection.strip_suffix('s').unwrap_or(collection);
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => format!("{}{}_filter", first.to_ascii_uppercase(), chars.as_str()),
        None => "_filter".to_string(),
    }
}

fn extract_page(
    response: &serde_json::Value,
    collection: &str,
) -> Result<Vec<serde_json::Value>, DataSourceError> {
    if let Some(errors) = response.get("errors").and_then(|e| e.as_array()) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect();
            return Err(DataSourceError::QueryError(messages.join("; ")));
        }
    }

    response
        .get("data")
        .and_then(|d| d.get(collection))
        .and_then(|c| c.as_array())
        .cloned()
        .ok_or_else(|| {
            DataSourceError::ParseError(format!("Expected array at data.{}", collection))
        })
}
