//! Derived metrics: progress, time remaining, per-kind totals and gating.

use crate::domain::{
    AggregateOf, Amount, CreationRecord, Domain, EventKind, EventRecord, Metric, Multiplicity,
    RawAmount, TimeSec,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Time left until the deadline at the evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TimeRemaining {
    Remaining { seconds: i64 },
    /// Deadline reached or passed; render "Expired", never a negative value.
    Elapsed,
    /// No usable deadline.
    Unknown,
}

impl TimeRemaining {
    pub fn between(deadline: Option<TimeSec>, now: TimeSec) -> Self {
        match deadline {
            None => TimeRemaining::Unknown,
            Some(deadline) => match deadline.as_secs().saturating_sub(now.as_secs()) {
                seconds if seconds > 0 => TimeRemaining::Remaining { seconds },
                _ => TimeRemaining::Elapsed,
            },
        }
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRemaining::Remaining { seconds } => {
                let days = seconds / 86_400;
                let hours = (seconds % 86_400) / 3_600;
                let minutes = (seconds % 3_600) / 60;
                if days > 0 {
                    write!(f, "{}d {}h {}m", days, hours, minutes)
                } else if hours > 0 {
                    write!(f, "{}h {}m", hours, minutes)
                } else if minutes > 0 {
                    write!(f, "{}m", minutes)
                } else {
                    write!(f, "{}s", seconds)
                }
            }
            TimeRemaining::Elapsed => f.write_str("Expired"),
            TimeRemaining::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Count and summed amount of one multi-occurrence kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindTotal {
    pub count: usize,
    /// `None` when the kind carries no amount field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Metric<Amount>>,
}

/// Allowance and balance of the viewing account, fetched outside the event
/// model. Both are smallest-unit decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowanceSnapshot {
    pub allowance: Option<RawAmount>,
    pub balance: Option<RawAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics<K: Ord> {
    /// Percent in `[0, 100]`, two decimals. `None` for domains without a
    /// funding target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<Metric<f64>>,
    pub time_remaining: TimeRemaining,
    pub totals_by_kind: BTreeMap<K, KindTotal>,
    /// `allowance < requiredAmount`; `None` without an allowance snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<Metric<bool>>,
    /// `balance < requiredAmount`; `None` without a balance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insufficient_balance: Option<Metric<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_outstanding: Option<Metric<Amount>>,
}

impl<K: Ord> DerivedMetrics<K> {
    /// Number of metrics that could not be computed.
    pub fn unavailable_count(&self) -> usize {
        let totals = self
            .totals_by_kind
            .values()
            .filter(|t| matches!(t.amount, Some(Metric::Unavailable { .. })))
            .count();
        let others = [
            self.progress_percent.as_ref().map(Metric::is_available),
            self.approval_required.as_ref().map(Metric::is_available),
            self.insufficient_balance.as_ref().map(Metric::is_available),
            self.stake_outstanding.as_ref().map(Metric::is_available),
        ]
        .into_iter()
        .filter(|available| *available == Some(false))
        .count();
        totals + others
    }
}

pub type MetricsOf<D> = DerivedMetrics<<D as Domain>::Kind>;

/// Compute every derived metric of one aggregate at `now`.
pub fn compute<D: Domain>(
    aggregate: &AggregateOf<D>,
    now: TimeSec,
    snapshot: &AllowanceSnapshot,
) -> MetricsOf<D> {
    let totals_by_kind = D::KINDS
        .iter()
        .filter(|kind| D::multiplicity(**kind) == Multiplicity::Many)
        .map(|kind| {
            let events = aggregate.events(*kind);
            let amount = D::schema(*kind)
                .amount_field
                .map(|_| sum_amounts(events));
            (
                *kind,
                KindTotal {
                    count: events.len(),
                    amount,
                },
            )
        })
        .collect();

    let progress_percent = D::PROGRESS_KIND.and_then(|kind| {
        D::progress_target(&aggregate.created)
            .map(|target| progress(sum_amounts(aggregate.events(kind)), target.metric()))
    });

    let required = D::required_amount(&aggregate.created);
    let approval_required = below(snapshot.allowance.as_ref(), required);
    let insufficient_balance = below(snapshot.balance.as_ref(), required);

    DerivedMetrics {
        progress_percent,
        time_remaining: TimeRemaining::between(aggregate.created.deadline(), now),
        totals_by_kind,
        approval_required,
        insufficient_balance,
        stake_outstanding: D::outstanding(aggregate),
    }
}

/// Exact sum of the amounts of `events`. Any missing, malformed or
/// overflowing amount makes the whole sum unavailable.
pub fn sum_amounts<K: EventKind>(events: &[EventRecord<K>]) -> Metric<Amount> {
    let mut total = Amount::ZERO;
    for event in events {
        let Some(raw) = &event.amount else {
            return Metric::unavailable(format!(
                "{} event {} has no amount",
                event.kind, event.event_key
            ));
        };
        let amount = match raw.parse() {
            Ok(amount) => amount,
            Err(e) => {
                return Metric::unavailable(format!(
                    "{} event {}: {}",
                    event.kind, event.event_key, e
                ))
            }
        };
        total = match total.checked_add(amount) {
            Some(total) => total,
            None => return Metric::unavailable(format!("{} total overflows uint256", event.kind)),
        };
    }
    Metric::available(total)
}

/// `min(100, 100 * raised / target)` in basis points, zero for a zero target.
fn progress(raised: Metric<Amount>, target: Metric<Amount>) -> Metric<f64> {
    raised.and_then(|raised| {
        target.map(|target| raised.basis_points_of(target) as f64 / 100.0)
    })
}

fn below(held: Option<&RawAmount>, required: Option<&RawAmount>) -> Option<Metric<bool>> {
    let (held, required) = (held?, required?);
    Some(held.metric().and_then(|held| {
        required.metric().map(|required| held < required)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Address, Bounty, BountyKind, BountyPosted, EntityAggregate, EntityId, FundCreated,
        FundKind, StudyFund,
    };

    fn fund(target: &str, contributions: &[&str], deadline: i64) -> AggregateOf<StudyFund> {
        let mut agg = EntityAggregate::new(
            FundCreated {
                entity_id: EntityId::new("7"),
                creator: Address::new("0xcreator"),
                description: String::new(),
                category: String::new(),
                deadline: Some(TimeSec::new(deadline)),
                target_amount: RawAmount::from(target),
                contribution_amount: RawAmount::from("25"),
                max_participants: None,
                created_at: Some(TimeSec::new(1)),
                tx_hash: None,
                event_key: "eq:created".to_string(),
            },
            StudyFund::KINDS,
        );
        for (i, amount) in contributions.iter().enumerate() {
            agg.events
                .entry(FundKind::Contributed)
                .or_default()
                .push(EventRecord::new(
                    FundKind::Contributed,
                    EntityId::new("7"),
                    Some(Address::new(format!("0xc{}", i))),
                    Some(RawAmount::from(*amount)),
                    Some(TimeSec::new(10 + i as i64)),
                    None,
                ));
        }
        agg
    }

    fn bounty(stake: &str) -> AggregateOf<Bounty> {
        EntityAggregate::new(
            BountyPosted {
                entity_id: EntityId::new("1"),
                poster: Address::new("0xposter"),
                description: String::new(),
                category: String::new(),
                deadline: None,
                stake: RawAmount::from(stake),
                tip: RawAmount::from("25"),
                max_claimants: None,
                created_at: Some(TimeSec::new(1)),
                tx_hash: None,
                event_key: "eq:posted".to_string(),
            },
            Bounty::KINDS,
        )
    }

    fn snapshot(allowance: &str) -> AllowanceSnapshot {
        AllowanceSnapshot {
            allowance: Some(RawAmount::from(allowance)),
            balance: None,
        }
    }

    #[test]
    fn progress_nine_of_ten_contributions() {
        let agg = fund("250", &["25"; 9], 1_000);
        let m = compute::<StudyFund>(&agg, TimeSec::new(0), &AllowanceSnapshot::default());
        assert_eq!(m.progress_percent, Some(Metric::available(90.0)));
        assert_eq!(
            m.totals_by_kind[&FundKind::Contributed],
            KindTotal {
                count: 9,
                amount: Some(Metric::available(Amount::from_u64(225))),
            }
        );
    }

    #[test]
    fn progress_is_clamped_and_zero_target_is_zero() {
        let over = fund("100", &["80", "80"], 1_000);
        let m = compute::<StudyFund>(&over, TimeSec::new(0), &AllowanceSnapshot::default());
        assert_eq!(m.progress_percent, Some(Metric::available(100.0)));

        let zero = fund("0", &["80"], 1_000);
        let m = compute::<StudyFund>(&zero, TimeSec::new(0), &AllowanceSnapshot::default());
        assert_eq!(m.progress_percent, Some(Metric::available(0.0)));
    }

    #[test]
    fn malformed_contribution_is_unavailable_not_zero() {
        let agg = fund("250", &["25", "1e3"], 1_000);
        let m = compute::<StudyFund>(&agg, TimeSec::new(0), &AllowanceSnapshot::default());
        assert!(matches!(m.progress_percent, Some(Metric::Unavailable { .. })));
        assert!(matches!(
            m.totals_by_kind[&FundKind::Contributed].amount,
            Some(Metric::Unavailable { .. })
        ));
        assert_eq!(m.unavailable_count(), 2);
    }

    #[test]
    fn totals_cover_only_multi_occurrence_kinds() {
        let agg = fund("250", &[], 1_000);
        let m = compute::<StudyFund>(&agg, TimeSec::new(0), &AllowanceSnapshot::default());
        assert_eq!(m.totals_by_kind.len(), 1);

        let m = compute::<Bounty>(&bounty("10"), TimeSec::new(0), &AllowanceSnapshot::default());
        let kinds: Vec<_> = m.totals_by_kind.keys().copied().collect();
        assert_eq!(
            kinds,
            vec![BountyKind::Claimed, BountyKind::Submitted, BountyKind::Completed]
        );
        assert_eq!(m.totals_by_kind[&BountyKind::Submitted].amount, None);
    }

    #[test]
    fn approval_gating_is_exact() {
        let agg = bounty("10000000");
        let m = compute::<Bounty>(&agg, TimeSec::new(0), &snapshot("0"));
        assert_eq!(m.approval_required, Some(Metric::available(true)));

        let m = compute::<Bounty>(&agg, TimeSec::new(0), &snapshot("10000000"));
        assert_eq!(m.approval_required, Some(Metric::available(false)));

        let m = compute::<Bounty>(&agg, TimeSec::new(0), &snapshot("9999999"));
        assert_eq!(m.approval_required, Some(Metric::available(true)));
    }

    #[test]
    fn infinite_allowance_never_requires_approval() {
        let max = Amount::MAX.to_string();
        let agg = bounty("10000000");
        let m = compute::<Bounty>(&agg, TimeSec::new(0), &snapshot(&max));
        assert_eq!(m.approval_required, Some(Metric::available(false)));
    }

    #[test]
    fn gating_without_snapshot_is_absent() {
        let m = compute::<Bounty>(&bounty("10"), TimeSec::new(0), &AllowanceSnapshot::default());
        assert_eq!(m.approval_required, None);
        assert_eq!(m.insufficient_balance, None);
    }

    #[test]
    fn insufficient_balance_compares_balance() {
        let snap = AllowanceSnapshot {
            allowance: None,
            balance: Some(RawAmount::from("5")),
        };
        let m = compute::<Bounty>(&bounty("10"), TimeSec::new(0), &snap);
        assert_eq!(m.insufficient_balance, Some(Metric::available(true)));
    }

    #[test]
    fn time_remaining_boundaries() {
        let deadline = Some(TimeSec::new(1_000));
        assert_eq!(
            TimeRemaining::between(deadline, TimeSec::new(999)),
            TimeRemaining::Remaining { seconds: 1 }
        );
        assert_eq!(TimeRemaining::between(deadline, TimeSec::new(1_000)), TimeRemaining::Elapsed);
        assert_eq!(TimeRemaining::between(None, TimeSec::new(0)), TimeRemaining::Unknown);
    }

    #[test]
    fn time_remaining_display() {
        let t = TimeRemaining::Remaining {
            seconds: 2 * 86_400 + 5 * 3_600 + 30 * 60 + 12,
        };
        assert_eq!(t.to_string(), "2d 5h 30m");
        assert_eq!(TimeRemaining::Remaining { seconds: 45 }.to_string(), "45s");
        assert_eq!(TimeRemaining::Elapsed.to_string(), "Expired");
    }
}
