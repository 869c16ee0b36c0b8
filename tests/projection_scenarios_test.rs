use eventlens::datasource::MockEventSource;
use eventlens::domain::{
    Amount, Bounty, BountyKind, BountyStatus, EntityId, FundKind, FundStatus, Metric, StudyFund,
    TimeSec,
};
use eventlens::engine::{AllowanceSnapshot, TimeRemaining};
use eventlens::orchestration::{EventFetcher, EventFilter, Projector};
use eventlens::RawAmount;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_700_000_000;
const WORKER: &str = "0x00000000000000000000000000000000000000aa";
const POSTER: &str = "0x00000000000000000000000000000000000000bb";

fn projector(mock: MockEventSource) -> Projector {
    Projector::new(EventFetcher::new(
        Arc::new(mock),
        4,
        Duration::from_secs(5),
    ))
}

fn bounty_posted(id: &str, deadline: i64) -> Value {
    json!({
        "id": format!("0xposted{}", id),
        "bountyId": id,
        "poster": POSTER,
        "description": "Proofread thesis chapter",
        "category": "writing",
        "deadline": deadline.to_string(),
        "stake": "10",
        "tip": "25",
        "maxClaimants": "1",
        "blockTimestamp": (NOW - 100).to_string(),
        "transactionHash": format!("0xaa{}", id)
    })
}

fn claimed(id: &str) -> Value {
    json!({
        "bountyId": id,
        "worker": WORKER,
        "stake": "10",
        "blockTimestamp": (NOW - 50).to_string(),
        "transactionHash": format!("0xbb{}", id)
    })
}

fn completed(id: &str) -> Value {
    json!({
        "bountyId": id,
        "worker": WORKER,
        "tipPaid": "25",
        "blockTimestamp": (NOW - 10).to_string(),
        "transactionHash": format!("0xcc{}", id)
    })
}

fn fund_created(id: &str, target: &str, deadline: i64) -> Value {
    json!({
        "fundId": id,
        "creator": POSTER,
        "description": "Shared statistics textbook",
        "category": "books",
        "deadline": deadline.to_string(),
        "targetAmount": target,
        "contributionAmount": "25",
        "maxParticipants": "10",
        "blockTimestamp": (NOW - 1000).to_string(),
        "transactionHash": format!("0xf0{}", id)
    })
}

fn contribution(id: &str, n: usize) -> Value {
    json!({
        "fundId": id,
        "contributor": format!("0x{:040x}", n + 1),
        "amount": "25",
        "blockTimestamp": (NOW - 500 + n as i64).to_string(),
        "transactionHash": format!("0xc{:03}", n)
    })
}

async fn project_bounties(
    mock: MockEventSource,
    now: i64,
) -> eventlens::orchestration::BatchOf<Bounty> {
    projector(mock)
        .project::<Bounty>(
            &EventFilter::All,
            &AllowanceSnapshot::default(),
            Some(TimeSec::new(now)),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn bounty_claimed_then_completed() {
    let deadline = NOW + 3600;
    let mock = MockEventSource::new()
        .with_row("bountyPosteds", bounty_posted("1", deadline))
        .with_row("bountyClaimeds", claimed("1"));
    let batch = project_bounties(mock.clone(), NOW).await;
    assert_eq!(batch.projections[0].status, BountyStatus::Claimed);
    assert_eq!(
        batch.projections[0].metrics.time_remaining,
        TimeRemaining::Remaining { seconds: 3600 }
    );
    assert_eq!(
        batch.projections[0].metrics.stake_outstanding,
        Some(Metric::available(Amount::from_u64(10)))
    );

    let mock = mock.with_row("bountyCompleteds", completed("1"));
    let batch = project_bounties(mock, NOW).await;
    let projection = &batch.projections[0];
    assert_eq!(projection.status, BountyStatus::Completed);
    assert_eq!(
        projection.metrics.totals_by_kind[&BountyKind::Completed].amount,
        Some(Metric::available(Amount::from_u64(25)))
    );
    assert_eq!(
        projection.metrics.stake_outstanding,
        Some(Metric::available(Amount::ZERO))
    );
}

#[tokio::test]
async fn completed_wins_even_past_deadline_and_cancelled() {
    let mock = MockEventSource::new()
        .with_row("bountyPosteds", bounty_posted("1", NOW))
        .with_row("bountyClaimeds", claimed("1"))
        .with_row("bountyCompleteds", completed("1"))
        .with_row(
            "bountyCancelleds",
            json!({"bountyId": "1", "poster": POSTER, "blockTimestamp": NOW.to_string()}),
        );
    let batch = project_bounties(mock, NOW + 10_000).await;
    assert_eq!(batch.projections[0].status, BountyStatus::Completed);
    assert_eq!(batch.report.ambiguous_terminal_states, 1);
    assert_eq!(batch.projections[0].anomalies.len(), 1);
}

#[tokio::test]
async fn deadline_boundary() {
    let deadline = NOW + 3600;
    let mock = MockEventSource::new().with_row("bountyPosteds", bounty_posted("1", deadline));

    let batch = project_bounties(mock.clone(), deadline - 1).await;
    assert_eq!(batch.projections[0].status, BountyStatus::Open);

    let batch = project_bounties(mock.clone(), deadline).await;
    assert_eq!(batch.projections[0].status, BountyStatus::Open);

    let batch = project_bounties(mock, deadline + 1).await;
    assert_eq!(batch.projections[0].status, BountyStatus::Expired);
    assert_eq!(
        batch.projections[0].metrics.time_remaining,
        TimeRemaining::Elapsed
    );
}

#[tokio::test]
async fn fund_nine_contributions_is_ninety_percent_and_active() {
    let contributions: Vec<Value> = (0..9).map(|n| contribution("4", n)).collect();
    let mock = MockEventSource::new()
        .with_row("studyFundCreateds", fund_created("4", "250", NOW + 86_400))
        .with_rows("contributionMades", contributions);

    let batch = projector(mock)
        .project::<StudyFund>(
            &EventFilter::All,
            &AllowanceSnapshot::default(),
            Some(TimeSec::new(NOW)),
        )
        .await
        .unwrap();

    let projection = &batch.projections[0];
    assert_eq!(projection.status, FundStatus::Active);
    assert_eq!(projection.metrics.progress_percent, Some(Metric::available(90.0)));
    let total = &projection.metrics.totals_by_kind[&FundKind::Contributed];
    assert_eq!(total.count, 9);
    assert_eq!(total.amount, Some(Metric::available(Amount::from_u64(225))));
}

#[tokio::test]
async fn fund_expired_event_outranks_target_reached() {
    let mock = MockEventSource::new()
        .with_row("studyFundCreateds", fund_created("4", "250", NOW + 86_400))
        .with_row(
            "targetReacheds",
            json!({"fundId": "4", "totalAmount": "250", "blockTimestamp": NOW.to_string()}),
        )
        .with_row(
            "fundExpireds",
            json!({"fundId": "4", "refundedAmount": "0", "blockTimestamp": NOW.to_string()}),
        );

    let batch = projector(mock)
        .project::<StudyFund>(
            &EventFilter::All,
            &AllowanceSnapshot::default(),
            Some(TimeSec::new(NOW)),
        )
        .await
        .unwrap();
    assert_eq!(batch.projections[0].status, FundStatus::Expired);
    assert_eq!(batch.report.ambiguous_terminal_states, 1);
}

#[tokio::test]
async fn zero_target_reports_zero_progress() {
    let mock = MockEventSource::new()
        .with_row("studyFundCreateds", fund_created("4", "0", NOW + 86_400))
        .with_row("contributionMades", contribution("4", 0));
    let batch = projector(mock)
        .project::<StudyFund>(
            &EventFilter::All,
            &AllowanceSnapshot::default(),
            Some(TimeSec::new(NOW)),
        )
        .await
        .unwrap();
    assert_eq!(
        batch.projections[0].metrics.progress_percent,
        Some(Metric::available(0.0))
    );
}

#[tokio::test]
async fn approval_required_against_usdc_units() {
    let mock = MockEventSource::new().with_row(
        "bountyPosteds",
        json!({
            "bountyId": "1",
            "poster": POSTER,
            "deadline": (NOW + 3600).to_string(),
            "stake": "10000000",
            "tip": "25",
            "blockTimestamp": NOW.to_string()
        }),
    );
    let p = projector(mock);

    for (allowance, expected) in [("0", true), ("10000000", false)] {
        let snapshot = AllowanceSnapshot {
            allowance: Some(RawAmount::from(allowance)),
            balance: None,
        };
        let batch = p
            .project::<Bounty>(&EventFilter::All, &snapshot, Some(TimeSec::new(NOW)))
            .await
            .unwrap();
        assert_eq!(
            batch.projections[0].metrics.approval_required,
            Some(Metric::available(expected)),
            "allowance {}",
            allowance
        );
    }
}

#[tokio::test]
async fn duplicate_delivery_collapses() {
    let mock = MockEventSource::new()
        .with_rows(
            "bountyPosteds",
            vec![bounty_posted("1", NOW + 3600), bounty_posted("1", NOW + 3600)],
        )
        .with_rows("bountyClaimeds", vec![claimed("1"), claimed("1")]);
    let batch = project_bounties(mock, NOW).await;
    assert_eq!(batch.projections.len(), 1);
    assert_eq!(batch.projections[0].aggregate.count(BountyKind::Claimed), 1);
    assert_eq!(batch.report.duplicates_dropped, 2);
}

#[tokio::test]
async fn recomputation_is_deterministic_across_delivery_order() {
    let posted = vec![
        bounty_posted("3", NOW + 3600),
        bounty_posted("1", NOW + 3600),
        bounty_posted("2", NOW - 1),
    ];
    let claims = vec![claimed("1"), claimed("3"), claimed("9")];
    let mut reversed_posted = posted.clone();
    reversed_posted.reverse();
    let mut reversed_claims = claims.clone();
    reversed_claims.reverse();

    let a = project_bounties(
        MockEventSource::new()
            .with_rows("bountyPosteds", posted)
            .with_rows("bountyClaimeds", claims),
        NOW,
    )
    .await;
    let b = project_bounties(
        MockEventSource::new()
            .with_rows("bountyPosteds", reversed_posted)
            .with_rows("bountyClaimeds", reversed_claims),
        NOW,
    )
    .await;

    assert_eq!(
        serde_json::to_vec(&a).unwrap(),
        serde_json::to_vec(&b).unwrap()
    );
    let ids: Vec<&str> = a.projections.iter().map(|p| p.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(a.projections[1].status, BountyStatus::Expired);
    assert_eq!(a.report.orphans[0].entity_id, EntityId::new("9"));
}

#[tokio::test]
async fn malformed_amount_is_unavailable_not_zero() {
    let mock = MockEventSource::new()
        .with_row("studyFundCreateds", fund_created("4", "250", NOW + 86_400))
        .with_row(
            "contributionMades",
            json!({
                "fundId": "4",
                "contributor": WORKER,
                "amount": "twenty-five",
                "blockTimestamp": NOW.to_string()
            }),
        );
    let batch = projector(mock)
        .project::<StudyFund>(
            &EventFilter::All,
            &AllowanceSnapshot::default(),
            Some(TimeSec::new(NOW)),
        )
        .await
        .unwrap();

    let projection = &batch.projections[0];
    assert_eq!(projection.status, FundStatus::Active);
    assert!(matches!(
        projection.metrics.progress_percent,
        Some(Metric::Unavailable { .. })
    ));
    assert_eq!(batch.report.unavailable_metrics, 2);
}

#[tokio::test]
async fn completed_row_without_timestamp_still_completes() {
    let mock = MockEventSource::new()
        .with_row("bountyPosteds", bounty_posted("1", NOW + 3600))
        .with_row("bountyClaimeds", claimed("1"))
        .with_row(
            "bountyCompleteds",
            json!({
                "bountyId": "1",
                "worker": WORKER,
                "tipPaid": "25",
                "blockTimestamp": null,
                "transactionHash": "0xcc1"
            }),
        );
    let batch = project_bounties(mock, NOW).await;

    let projection = &batch.projections[0];
    assert_eq!(projection.status, BountyStatus::Completed);
    assert_eq!(
        projection.metrics.totals_by_kind[&BountyKind::Completed].amount,
        Some(Metric::available(Amount::from_u64(25)))
    );
    assert_eq!(batch.report.rows_rejected, 0);
    assert_eq!(batch.report.rows_untimed, 1);
}

fn same_tx_completion(tip: &str, row_id: Option<&str>) -> Value {
    let mut row = json!({
        "bountyId": "1",
        "worker": WORKER,
        "tipPaid": tip,
        "blockTimestamp": (NOW - 10).to_string(),
        "transactionHash": "0xd1"
    });
    if let Some(id) = row_id {
        row["id"] = json!(id);
    }
    row
}

#[tokio::test]
async fn conflicting_payloads_in_one_transaction_are_order_independent() {
    let forward = vec![same_tx_completion("25", None), same_tx_completion("99", None)];
    let mut backward = forward.clone();
    backward.reverse();

    let mut batches = Vec::new();
    for rows in [forward, backward] {
        let mock = MockEventSource::new()
            .with_row("bountyPosteds", bounty_posted("1", NOW + 3600))
            .with_rows("bountyCompleteds", rows);
        batches.push(project_bounties(mock, NOW).await);
    }

    assert_eq!(
        serde_json::to_vec(&batches[0]).unwrap(),
        serde_json::to_vec(&batches[1]).unwrap()
    );
    let projection = &batches[0].projections[0];
    assert_eq!(
        projection.metrics.totals_by_kind[&BountyKind::Completed].amount,
        Some(Metric::available(Amount::from_u64(25)))
    );
    assert_eq!(batches[0].report.conflicting_duplicates, 1);
}

#[tokio::test]
async fn distinct_logs_in_one_transaction_are_summed() {
    let mock = MockEventSource::new()
        .with_row("bountyPosteds", bounty_posted("1", NOW + 3600))
        .with_rows(
            "bountyCompleteds",
            vec![
                same_tx_completion("25", Some("0xd1-1")),
                same_tx_completion("99", Some("0xd1-2")),
            ],
        );
    let batch = project_bounties(mock, NOW).await;

    let total = &batch.projections[0].metrics.totals_by_kind[&BountyKind::Completed];
    assert_eq!(total.count, 2);
    assert_eq!(total.amount, Some(Metric::available(Amount::from_u64(124))));
    assert_eq!(batch.report.conflicting_duplicates, 0);
}
