//! Handlers shared by every domain's list and detail endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::AppState;
use crate::domain::{
    format_units, Address, Amount, Decimal, Domain, EntityId, EventKind, EventRecord, Metric,
    RawAmount, StatusLabel, TimeSec,
};
use crate::engine::{AllowanceSnapshot, Anomaly, TimeRemaining};
use crate::error::AppError;
use crate::orchestration::{EventFilter, ProjectionOf, ProjectionReport};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionQuery {
    pub owner: Option<String>,
    /// Evaluation instant override, Unix seconds.
    pub now: Option<i64>,
    pub allowance: Option<String>,
    pub balance: Option<String>,
    pub include_events: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<C, K> {
    pub domain: &'static str,
    pub evaluated_at: i64,
    pub items: Vec<ProjectionDto<C, K>>,
    pub report: ProjectionReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse<C, K> {
    pub domain: &'static str,
    pub evaluated_at: i64,
    pub item: ProjectionDto<C, K>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionDto<C, K> {
    pub entity_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<usize>,
    pub details: C,
    pub time_remaining: TimeRemaining,
    pub time_remaining_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<Metric<f64>>,
    pub totals_by_kind: BTreeMap<&'static str, TotalDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<Metric<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insufficient_balance: Option<Metric<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_outstanding: Option<Metric<AmountDto>>,
    pub anomalies: Vec<Anomaly>,
    /// Every event of the entity, oldest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventRecord<K>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalDto {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Metric<AmountDto>>,
}

/// Exact smallest-unit amount plus its display value.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountDto {
    pub raw: Amount,
    /// `None` when the value exceeds the display decimal range.
    pub formatted: Option<Decimal>,
}

impl AmountDto {
    fn new(raw: Amount, decimals: u32) -> Self {
        Self {
            raw,
            formatted: format_units(raw, decimals).value().copied(),
        }
    }
}

fn amount_metric(metric: Metric<Amount>, decimals: u32) -> Metric<AmountDto> {
    metric.map(|raw| AmountDto::new(raw, decimals))
}

/// Parsed query parameters shared by list and detail handlers.
struct Request {
    snapshot: AllowanceSnapshot,
    now: Option<TimeSec>,
    include_events: bool,
}

fn parse_request(params: &ProjectionQuery) -> Result<Request, AppError> {
    Ok(Request {
        snapshot: AllowanceSnapshot {
            allowance: parse_amount("allowance", params.allowance.as_deref())?,
            balance: parse_amount("balance", params.balance.as_deref())?,
        },
        now: params.now.map(TimeSec::new),
        include_events: params.include_events.unwrap_or(false),
    })
}

fn parse_amount(name: &str, raw: Option<&str>) -> Result<Option<RawAmount>, AppError> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let amount = RawAmount::new(raw.trim());
            amount
                .parse()
                .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", name, e)))?;
            Ok(Some(amount))
        }
    }
}

fn parse_owner(owner: &str) -> Result<Address, AppError> {
    Address::from_str(owner).map_err(|_| AppError::BadRequest("Invalid owner address".into()))
}

pub async fn list<D: Domain>(
    params: ProjectionQuery,
    state: AppState,
) -> Result<ListResponse<D::Created, D::Kind>, AppError> {
    let request = parse_request(&params)?;
    let filter = match params.owner.as_deref() {
        Some("") | None => EventFilter::All,
        Some(owner) => EventFilter::Owner(parse_owner(owner)?),
    };

    let batch = state
        .projector
        .project::<D>(&filter, &request.snapshot, request.now)
        .await?;

    let decimals = state.config.token_decimals;
    let items = batch
        .projections
        .into_iter()
        .map(|p| to_dto::<D>(p, decimals, request.include_events))
        .collect();

    Ok(ListResponse {
        domain: batch.domain,
        evaluated_at: batch.evaluated_at.as_secs(),
        items,
        report: batch.report,
    })
}

pub async fn get_one<D: Domain>(
    id: String,
    params: ProjectionQuery,
    state: AppState,
) -> Result<EntityResponse<D::Created, D::Kind>, AppError> {
    let request = parse_request(&params)?;
    let entity_id = EntityId::new(&id);
    if entity_id.is_empty() {
        return Err(AppError::BadRequest("Empty entity id".into()));
    }

    let batch = state
        .projector
        .project::<D>(
            &EventFilter::Entity(entity_id.clone()),
            &request.snapshot,
            request.now,
        )
        .await?;

    let decimals = state.config.token_decimals;
    let evaluated_at = batch.evaluated_at.as_secs();
    if let Some(orphan) = batch.find_orphan(&entity_id) {
        return Err(AppError::NotFound(format!(
            "{} {} is orphaned: {} events without a creation record",
            D::NAME,
            entity_id,
            orphan.event_count
        )));
    }
    let Some(projection) = batch
        .projections
        .into_iter()
        .find(|p| p.entity_id == entity_id)
    else {
        return Err(AppError::NotFound(format!(
            "{} {} not found",
            D::NAME,
            entity_id
        )));
    };
    let item = to_dto::<D>(projection, decimals, request.include_events);

    Ok(EntityResponse {
        domain: D::NAME,
        evaluated_at,
        item,
    })
}

fn to_dto<D: Domain>(
    projection: ProjectionOf<D>,
    decimals: u32,
    include_events: bool,
) -> ProjectionDto<D::Created, D::Kind> {
    let metrics = projection.metrics;

    let totals_by_kind = metrics
        .totals_by_kind
        .into_iter()
        .map(|(kind, total)| {
            (
                kind.as_str(),
                TotalDto {
                    count: total.count,
                    amount: total.amount.map(|m| amount_metric(m, decimals)),
                },
            )
        })
        .collect();

    let events = include_events.then(|| {
        let mut events: Vec<EventRecord<D::Kind>> = projection
            .aggregate
            .events
            .into_values()
            .flatten()
            .collect();
        events.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
        events
    });

    ProjectionDto {
        entity_id: projection.entity_id.as_str().to_string(),
        status: projection.status.as_str(),
        matched_rule: projection.matched_rule,
        details: projection.aggregate.created,
        time_remaining: metrics.time_remaining,
        time_remaining_text: metrics.time_remaining.to_string(),
        progress_percent: metrics.progress_percent,
        totals_by_kind,
        approval_required: metrics.approval_required,
        insufficient_balance: metrics.insufficient_balance,
        stake_outstanding: metrics
            .stake_outstanding
            .map(|m| amount_metric(m, decimals)),
        anomalies: projection.anomalies,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_rejects_non_digits() {
        assert!(parse_amount("allowance", Some("10.5")).is_err());
        assert!(parse_amount("allowance", Some("")).is_err());
        assert_eq!(
            parse_amount("allowance", Some(" 10000000 ")).unwrap(),
            Some(RawAmount::from("10000000"))
        );
        assert_eq!(parse_amount("allowance", None).unwrap(), None);
    }

    #[test]
    fn test_parse_owner() {
        assert!(parse_owner("0x0000000000000000000000000000000000000001").is_ok());
        assert!(parse_owner("not-an-address").is_err());
    }

    #[test]
    fn test_amount_dto_formats_units() {
        let dto = AmountDto::new(Amount::from_u64(10_000_000), 6);
        assert_eq!(dto.formatted.map(|d| d.to_string()), Some("10".to_string()));
    }
}
