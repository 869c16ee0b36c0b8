//! Bounty domain: posted by a poster, claimed and worked by workers.

use crate::datasource::normalize::{RowError, RowReader};
use crate::domain::model::{
    Condition, CreationRecord, Domain, EventKind, Rule, StatusLabel, StreamSchema,
};
use crate::domain::{
    compute_event_key, Address, Amount, EntityAggregate, EntityId, Metric, Multiplicity,
    RawAmount, TimeSec,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Non-creation bounty events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BountyKind {
    Claimed,
    Submitted,
    Completed,
    Cancelled,
}

impl EventKind for BountyKind {
    fn as_str(&self) -> &'static str {
        match self {
            BountyKind::Claimed => "claimed",
            BountyKind::Submitted => "submitted",
            BountyKind::Completed => "completed",
            BountyKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BountyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BountyStatus {
    Open,
    Claimed,
    Submitted,
    Completed,
    Cancelled,
    Expired,
}

impl StatusLabel for BountyStatus {
    fn as_str(&self) -> &'static str {
        match self {
            BountyStatus::Open => "open",
            BountyStatus::Claimed => "claimed",
            BountyStatus::Submitted => "submitted",
            BountyStatus::Completed => "completed",
            BountyStatus::Cancelled => "cancelled",
            BountyStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for BountyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static attributes of a posted bounty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyPosted {
    pub entity_id: EntityId,
    pub poster: Address,
    pub description: String,
    pub category: String,
    pub deadline: Option<TimeSec>,
    /// Stake each worker locks when claiming.
    pub stake: RawAmount,
    /// Tip paid to each worker on completion.
    pub tip: RawAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_claimants: Option<u32>,
    /// `None` when the row's timestamp was missing or malformed.
    pub created_at: Option<TimeSec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub event_key: String,
}

impl CreationRecord for BountyPosted {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn owner(&self) -> &Address {
        &self.poster
    }

    fn deadline(&self) -> Option<TimeSec> {
        self.deadline
    }

    fn created_at(&self) -> Option<TimeSec> {
        self.created_at
    }

    fn event_key(&self) -> &str {
        &self.event_key
    }
}

pub const BOUNTY_POSTED: StreamSchema = StreamSchema {
    collection: "bountyPosteds",
    entity_field: "bountyId",
    actor_field: Some("poster"),
    amount_field: None,
    timestamp_field: "blockTimestamp",
    tx_field: "transactionHash",
    id_field: "id",
    fields: &[
        "id",
        "bountyId",
        "poster",
        "description",
        "category",
        "deadline",
        "stake",
        "tip",
        "maxClaimants",
        "blockTimestamp",
        "transactionHash",
    ],
};

pub const BOUNTY_CLAIMED: StreamSchema = StreamSchema {
    collection: "bountyClaimeds",
    entity_field: "bountyId",
    actor_field: Some("worker"),
    amount_field: Some("stake"),
    timestamp_field: "blockTimestamp",
    tx_field: "transactionHash",
    id_field: "id",
    fields: &["id", "bountyId", "worker", "stake", "blockTimestamp", "transactionHash"],
};

pub const BOUNTY_SUBMITTED: StreamSchema = StreamSchema {
    collection: "workSubmitteds",
    entity_field: "bountyId",
    actor_field: Some("worker"),
    amount_field: None,
    timestamp_field: "blockTimestamp",
    tx_field: "transactionHash",
    id_field: "id",
    fields: &["id", "bountyId", "worker", "blockTimestamp", "transactionHash"],
};

pub const BOUNTY_COMPLETED: StreamSchema = StreamSchema {
    collection: "bountyCompleteds",
    entity_field: "bountyId",
    actor_field: Some("worker"),
    amount_field: Some("tipPaid"),
    timestamp_field: "blockTimestamp",
    tx_field: "transactionHash",
    id_field: "id",
    fields: &["id", "bountyId", "worker", "tipPaid", "blockTimestamp", "transactionHash"],
};

pub const BOUNTY_CANCELLED: StreamSchema = StreamSchema {
    collection: "bountyCancelleds",
    entity_field: "bountyId",
    actor_field: Some("poster"),
    amount_field: None,
    timestamp_field: "blockTimestamp",
    tx_field: "transactionHash",
    id_field: "id",
    fields: &["id", "bountyId", "poster", "blockTimestamp", "transactionHash"],
};

/// The bounty domain.
#[derive(Debug, Clone, Copy)]
pub struct Bounty;

impl Domain for Bounty {
    const NAME: &'static str = "bounty";

    type Kind = BountyKind;
    type Created = BountyPosted;
    type Status = BountyStatus;

    const CREATED_KIND: &'static str = "posted";
    const CREATED: StreamSchema = BOUNTY_POSTED;
    const KINDS: &'static [BountyKind] = &[
        BountyKind::Claimed,
        BountyKind::Submitted,
        BountyKind::Completed,
        BountyKind::Cancelled,
    ];

    const PRECEDENCE: &'static [Rule<BountyKind, BountyStatus>] = &[
        Rule::new(Condition::Has(BountyKind::Completed), BountyStatus::Completed),
        Rule::new(Condition::Has(BountyKind::Cancelled), BountyStatus::Cancelled),
        Rule::new(Condition::Has(BountyKind::Submitted), BountyStatus::Submitted),
        Rule::new(Condition::Has(BountyKind::Claimed), BountyStatus::Claimed),
        Rule::new(Condition::PastDeadline, BountyStatus::Expired),
    ];
    const INITIAL: BountyStatus = BountyStatus::Open;
    const EXCLUSIVE_TERMINALS: &'static [&'static [BountyKind]] =
        &[&[BountyKind::Completed, BountyKind::Cancelled]];

    fn schema(kind: BountyKind) -> &'static StreamSchema {
        match kind {
            BountyKind::Claimed => &BOUNTY_CLAIMED,
            BountyKind::Submitted => &BOUNTY_SUBMITTED,
            BountyKind::Completed => &BOUNTY_COMPLETED,
            BountyKind::Cancelled => &BOUNTY_CANCELLED,
        }
    }

    fn multiplicity(kind: BountyKind) -> Multiplicity {
        match kind {
            // One bounty may be worked by up to `maxClaimants` workers.
            BountyKind::Claimed | BountyKind::Submitted | BountyKind::Completed => {
                Multiplicity::Many
            }
            BountyKind::Cancelled => Multiplicity::Single,
        }
    }

    fn parse_created(row: &serde_json::Value) -> Result<BountyPosted, RowError> {
        let reader = RowReader::new(row)?;
        let schema = &BOUNTY_POSTED;
        let entity_id = reader.entity_id(schema.entity_field)?;
        let poster = reader
            .address("poster")
            .ok_or(RowError::MissingField("poster"))?;
        let tx_hash = reader
            .text(schema.tx_field)
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());

        let created_at = reader.optional_timestamp(schema.timestamp_field);
        if created_at.is_none() {
            warn!(
                domain = Self::NAME,
                entity_id = %entity_id,
                "bounty creation row has no usable timestamp"
            );
        }

        let deadline = reader.optional_timestamp("deadline");
        if deadline.is_none() {
            warn!(
                domain = Self::NAME,
                entity_id = %entity_id,
                "bounty has no usable deadline"
            );
        }

        let event_key = compute_event_key(
            Self::CREATED_KIND,
            &entity_id,
            Some(&poster),
            created_at,
            tx_hash.as_deref(),
            reader.text(schema.id_field).as_deref(),
            None,
        );

        Ok(BountyPosted {
            entity_id,
            poster,
            description: reader.text("description").unwrap_or_default(),
            category: reader.text("category").unwrap_or_default(),
            deadline,
            stake: reader.amount("stake").unwrap_or_else(|| RawAmount::new("")),
            tip: reader.amount("tip").unwrap_or_else(|| RawAmount::new("")),
            max_claimants: reader.optional_u32("maxClaimants"),
            created_at,
            tx_hash,
            event_key,
        })
    }

    fn required_amount(created: &BountyPosted) -> Option<&RawAmount> {
        Some(&created.stake)
    }

    /// Stake locked by workers whose claim has no completion yet.
    /// Nothing is outstanding once the bounty is cancelled.
    fn outstanding(
        aggregate: &EntityAggregate<BountyPosted, BountyKind>,
    ) -> Option<Metric<Amount>> {
        if aggregate.has(BountyKind::Cancelled) {
            return Some(Metric::available(Amount::ZERO));
        }

        let completed: BTreeSet<&Address> = aggregate
            .events(BountyKind::Completed)
            .iter()
            .filter_map(|e| e.actor.as_ref())
            .collect();

        let open_claims: BTreeSet<&str> = aggregate
            .events(BountyKind::Claimed)
            .iter()
            .filter(|e| e.actor.as_ref().map_or(true, |a| !completed.contains(a)))
            .map(|e| {
                e.actor
                    .as_ref()
                    .map_or(e.event_key.as_str(), |a| a.as_str())
            })
            .collect();

        let stake = aggregate.created.stake.metric();
        Some(stake.and_then(|stake| {
            match stake.checked_mul_u64(open_claims.len() as u64) {
                Some(total) => Metric::available(total),
                None => Metric::unavailable("outstanding stake overflows uint256"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn precedence_puts_completed_first_and_expiry_after_claimed() {
        let statuses: Vec<_> = Bounty::PRECEDENCE.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                BountyStatus::Completed,
                BountyStatus::Cancelled,
                BountyStatus::Submitted,
                BountyStatus::Claimed,
                BountyStatus::Expired,
            ]
        );
        assert_eq!(Bounty::INITIAL, BountyStatus::Open);
    }

    #[test]
    fn every_kind_has_a_distinct_collection() {
        let mut collections: Vec<_> = Bounty::KINDS
            .iter()
            .map(|k| Bounty::schema(*k).collection)
            .collect();
        collections.push(Bounty::CREATED.collection);
        let unique: BTreeSet<_> = collections.iter().collect();
        assert_eq!(unique.len(), collections.len());
    }

    #[test]
    fn parse_posted_row() {
        let row = json!({
            "bountyId": "3",
            "poster": "0xPOSTER",
            "description": "Translate notes",
            "category": "language",
            "deadline": "1700003600",
            "stake": "10",
            "tip": "25",
            "maxClaimants": "2",
            "blockTimestamp": "1700000000",
            "transactionHash": "0xABC"
        });
        let posted = Bounty::parse_created(&row).unwrap();
        assert_eq!(posted.entity_id, EntityId::new("3"));
        assert_eq!(posted.poster, Address::new("0xposter"));
        assert_eq!(posted.deadline, Some(TimeSec::new(1_700_003_600)));
        assert_eq!(posted.stake, RawAmount::from("10"));
        assert_eq!(posted.tip, RawAmount::from("25"));
        assert_eq!(posted.max_claimants, Some(2));
        assert!(posted.event_key.starts_with("tx:"));
    }

    #[test]
    fn parse_posted_with_bad_deadline_has_none() {
        let row = json!({
            "bountyId": "3",
            "poster": "0xabc",
            "deadline": "soon",
            "blockTimestamp": "1"
        });
        let posted = Bounty::parse_created(&row).unwrap();
        assert_eq!(posted.deadline, None);
        assert_eq!(posted.stake, RawAmount::from(""));
    }

    #[test]
    fn parse_posted_without_timestamp_is_kept() {
        let row = json!({
            "id": "0xabc-1",
            "bountyId": "3",
            "poster": "0xabc",
            "blockTimestamp": null,
            "transactionHash": "0xabc"
        });
        let posted = Bounty::parse_created(&row).unwrap();
        assert_eq!(posted.created_at, None);
        assert_eq!(posted.entity_id, EntityId::new("3"));
    }

    #[test]
    fn parse_posted_requires_poster() {
        let row = json!({"bountyId": "3", "blockTimestamp": "1"});
        assert_eq!(
            Bounty::parse_created(&row).unwrap_err(),
            RowError::MissingField("poster")
        );
    }

    #[test]
    fn kind_serializes_as_wire_name() {
        for kind in Bounty::KINDS {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.as_str().to_string())
            );
        }
    }
}
