//! Study fund domain: pooled contributions towards a shared resource.

use crate::datasource::normalize::{RowError, RowReader};
use crate::domain::model::{
    Condition, CreationRecord, Domain, EventKind, Rule, StatusLabel, StreamSchema,
};
use crate::domain::{compute_event_key, Address, EntityId, Multiplicity, RawAmount, TimeSec};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FundKind {
    Contributed,
    TargetReached,
    Finalized,
    ResourcePurchased,
    AccessDistributed,
    /// Emitted by the contract when a fund is closed as expired.
    Expired,
}

impl EventKind for FundKind {
    fn as_str(&self) -> &'static str {
        match self {
            FundKind::Contributed => "contributed",
            FundKind::TargetReached => "targetReached",
            FundKind::Finalized => "finalized",
            FundKind::ResourcePurchased => "resourcePurchased",
            FundKind::AccessDistributed => "accessDistributed",
            FundKind::Expired => "expired",
        }
    }
}

impl std::fmt::Display for FundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FundStatus {
    Active,
    Funded,
    Finalized,
    ResourcePurchased,
    AccessDistributed,
    Expired,
}

impl StatusLabel for FundStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FundStatus::Active => "active",
            FundStatus::Funded => "funded",
            FundStatus::Finalized => "finalized",
            FundStatus::ResourcePurchased => "resourcePurchased",
            FundStatus::AccessDistributed => "accessDistributed",
            FundStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for FundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundCreated {
    pub entity_id: EntityId,
    pub creator: Address,
    pub description: String,
    pub category: String,
    pub deadline: Option<TimeSec>,
    pub target_amount: RawAmount,
    /// Fixed amount each participant contributes.
    pub contribution_amount: RawAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
    /// `None` when the row's timestamp was missing or malformed.
    pub created_at: Option<TimeSec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub event_key: String,
}

impl CreationRecord for FundCreated {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn owner(&self) -> &Address {
        &self.creator
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

const TS: &str = "blockTimestamp";
const TX: &str = "transactionHash";

pub const FUND_CREATED: StreamSchema = StreamSchema {
    collection: "studyFundCreateds",
    entity_field: "fundId",
    actor_field: Some("creator"),
    amount_field: None,
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &[
        "id",
        "fundId",
        "creator",
        "description",
        "category",
        "deadline",
        "targetAmount",
        "contributionAmount",
        "maxParticipants",
        TS,
        TX,
    ],
};

pub const FUND_CONTRIBUTED: StreamSchema = StreamSchema {
    collection: "contributionMades",
    entity_field: "fundId",
    actor_field: Some("contributor"),
    amount_field: Some("amount"),
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", "contributor", "amount", TS, TX],
};

pub const FUND_TARGET_REACHED: StreamSchema = StreamSchema {
    collection: "targetReacheds",
    entity_field: "fundId",
    actor_field: None,
    amount_field: Some("totalAmount"),
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", "totalAmount", TS, TX],
};

pub const FUND_FINALIZED: StreamSchema = StreamSchema {
    collection: "fundFinalizeds",
    entity_field: "fundId",
    actor_field: Some("finalizer"),
    amount_field: None,
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", "finalizer", TS, TX],
};

pub const FUND_RESOURCE_PURCHASED: StreamSchema = StreamSchema {
    collection: "resourcePurchaseds",
    entity_field: "fundId",
    actor_field: Some("seller"),
    amount_field: Some("price"),
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", "seller", "price", TS, TX],
};

pub const FUND_ACCESS_DISTRIBUTED: StreamSchema = StreamSchema {
    collection: "accessDistributeds",
    entity_field: "fundId",
    actor_field: None,
    amount_field: None,
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", TS, TX],
};

pub const FUND_EXPIRED: StreamSchema = StreamSchema {
    collection: "fundExpireds",
    entity_field: "fundId",
    actor_field: None,
    amount_field: Some("refundedAmount"),
    timestamp_field: TS,
    tx_field: TX,
    id_field: "id",
    fields: &["id", "fundId", "refundedAmount", TS, TX],
};

/// The study fund domain.
#[derive(Debug, Clone, Copy)]
pub struct StudyFund;

impl Domain for StudyFund {
    const NAME: &'static str = "studyFund";

    type Kind = FundKind;
    type Created = FundCreated;
    type Status = FundStatus;

    const CREATED_KIND: &'static str = "created";
    const CREATED: StreamSchema = FUND_CREATED;
    const KINDS: &'static [FundKind] = &[
        FundKind::Contributed,
        FundKind::TargetReached,
        FundKind::Finalized,
        FundKind::ResourcePurchased,
        FundKind::AccessDistributed,
        FundKind::Expired,
    ];

    const PRECEDENCE: &'static [Rule<FundKind, FundStatus>] = &[
        Rule::new(Condition::Has(FundKind::Expired), FundStatus::Expired),
        Rule::new(Condition::Has(FundKind::AccessDistributed), FundStatus::AccessDistributed),
        Rule::new(Condition::Has(FundKind::ResourcePurchased), FundStatus::ResourcePurchased),
        Rule::new(Condition::Has(FundKind::Finalized), FundStatus::Finalized),
        Rule::new(Condition::Has(FundKind::TargetReached), FundStatus::Funded),
        Rule::new(Condition::PastDeadline, FundStatus::Expired),
    ];
    const INITIAL: FundStatus = FundStatus::Active;
    const EXCLUSIVE_TERMINALS: &'static [&'static [FundKind]] = &[
        &[FundKind::Expired, FundKind::TargetReached],
        &[FundKind::Expired, FundKind::Finalized],
    ];

    const PROGRESS_KIND: Option<FundKind> = Some(FundKind::Contributed);

    fn schema(kind: FundKind) -> &'static StreamSchema {
        match kind {
            FundKind::Contributed => &FUND_CONTRIBUTED,
            FundKind::TargetReached => &FUND_TARGET_REACHED,
            FundKind::Finalized => &FUND_FINALIZED,
            FundKind::ResourcePurchased => &FUND_RESOURCE_PURCHASED,
            FundKind::AccessDistributed => &FUND_ACCESS_DISTRIBUTED,
            FundKind::Expired => &FUND_EXPIRED,
        }
    }

    fn multiplicity(kind: FundKind) -> Multiplicity {
        match kind {
            FundKind::Contributed => Multiplicity::Many,
            _ => Multiplicity::Single,
        }
    }

    fn parse_created(row: &serde_json::Value) -> Result<FundCreated, RowError> {
        let reader = RowReader::new(row)?;
        let schema = &FUND_CREATED;
        let entity_id = reader.entity_id(schema.entity_field)?;
        let creator = reader
            .address("creator")
            .ok_or(RowError::MissingField("creator"))?;
        let tx_hash = reader
            .text(schema.tx_field)
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());

        let created_at = reader.optional_timestamp(schema.timestamp_field);
        if created_at.is_none() {
            warn!(
                domain = Self::NAME,
                entity_id = %entity_id,
                "study fund creation row has no usable timestamp"
            );
        }

        let deadline = reader.optional_timestamp("deadline");
        if deadline.is_none() {
            warn!(
                domain = Self::NAME,
                entity_id = %entity_id,
                "study fund has no usable deadline"
            );
        }

        let event_key = compute_event_key(
            Self::CREATED_KIND,
            &entity_id,
            Some(&creator),
            created_at,
            tx_hash.as_deref(),
            reader.text(schema.id_field).as_deref(),
            None,
        );

        Ok(FundCreated {
            entity_id,
            creator,
            description: reader.text("description").unwrap_or_default(),
            category: reader.text("category").unwrap_or_default(),
            deadline,
            target_amount: reader
                .amount("targetAmount")
                .unwrap_or_else(|| RawAmount::new("")),
            contribution_amount: reader
                .amount("contributionAmount")
                .unwrap_or_else(|| RawAmount::new("")),
            max_participants: reader.optional_u32("maxParticipants"),
            created_at,
            tx_hash,
            event_key,
        })
    }

    fn progress_target(created: &FundCreated) -> Option<&RawAmount> {
        Some(&created.target_amount)
    }

    fn required_amount(created: &FundCreated) -> Option<&RawAmount> {
        Some(&created.contribution_amount)
    }
}
