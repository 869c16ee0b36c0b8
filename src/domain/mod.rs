//! Domain types for event-stream projection.
//!
//! This module provides:
//! - Exact uint256 amounts (`Amount`) and display decimals (`Decimal`)
//! - Domain primitives: TimeSec, Address, EntityId
//! - Event records with natural deduplication keys
//! - The `Domain` contract and its two implementations (bounties, study funds)

pub mod aggregate;
pub mod amount;
pub mod bounty;
pub mod decimal;
pub mod event;
pub mod metric;
pub mod model;
pub mod primitives;
pub mod study_fund;

pub use aggregate::{EntityAggregate, Orphan};
pub use amount::{format_units, Amount, AmountParseError, RawAmount};
pub use bounty::{Bounty, BountyKind, BountyPosted, BountyStatus};
pub use decimal::Decimal;
pub use event::{compute_event_key, DomainEvent, EventRecord, Multiplicity};
pub use metric::Metric;
pub use model::{
    AggregateOf, Condition, CreationRecord, Domain, EventKind, Rule, StatusLabel, StreamSchema,
};
pub use primitives::{Address, AddressParseError, EntityId, TimeSec};
pub use study_fund::{FundCreated, FundKind, FundStatus, StudyFund};
