//! Status resolver over a domain's canonical precedence table.

use crate::domain::{
    AggregateOf, Condition, CreationRecord, Domain, EventKind, StatusLabel, TimeSec,
};
use serde::Serialize;
use tracing::warn;

/// Data-quality finding attached to one projection. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Anomaly {
    /// Kinds from one exclusive terminal group co-occur. Precedence picked
    /// `resolved`.
    #[serde(rename_all = "camelCase")]
    AmbiguousTerminalState {
        kinds: Vec<&'static str>,
        resolved: &'static str,
    },
}

/// Output of the resolver for one aggregate at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<S> {
    pub status: S,
    /// Index into the precedence table; `None` when the initial status applied.
    pub matched_rule: Option<usize>,
    pub anomalies: Vec<Anomaly>,
}

/// Evaluate `D::PRECEDENCE` top to bottom; the first matching rule wins.
///
/// `now` is supplied by the caller. An entity is past its deadline only when
/// `now` is strictly greater than it; with no deadline it never expires.
pub fn resolve<D: Domain>(aggregate: &AggregateOf<D>, now: TimeSec) -> Resolution<D::Status> {
    let matched = D::PRECEDENCE
        .iter()
        .enumerate()
        .find(|(_, rule)| rule_applies::<D>(&rule.when, aggregate, now));

    let (status, matched_rule) = match matched {
        Some((index, rule)) => (rule.status, Some(index)),
        None => (D::INITIAL, None),
    };

    let anomalies = terminal_anomalies::<D>(aggregate, status);
    Resolution {
        status,
        matched_rule,
        anomalies,
    }
}

fn rule_applies<D: Domain>(
    condition: &Condition<D::Kind>,
    aggregate: &AggregateOf<D>,
    now: TimeSec,
) -> bool {
    match condition {
        Condition::Has(kind) => aggregate.has(*kind),
        Condition::PastDeadline => is_past_deadline(aggregate.created.deadline(), now),
    }
}

pub fn is_past_deadline(deadline: Option<TimeSec>, now: TimeSec) -> bool {
    deadline.is_some_and(|deadline| now > deadline)
}

fn terminal_anomalies<D: Domain>(aggregate: &AggregateOf<D>, status: D::Status) -> Vec<Anomaly> {
    D::EXCLUSIVE_TERMINALS
        .iter()
        .filter_map(|group| {
            let present: Vec<&'static str> = group
                .iter()
                .filter(|kind| aggregate.has(**kind))
                .map(|kind| kind.as_str())
                .collect();
            if present.len() < 2 {
                return None;
            }
            warn!(
                domain = D::NAME,
                entity_id = %aggregate.created.entity_id(),
                kinds = ?present,
                resolved = status.as_str(),
                "ambiguous terminal state"
            );
            Some(Anomaly::AmbiguousTerminalState {
                kinds: present,
                resolved: status.as_str(),
            })
        })
        .collect()
}
