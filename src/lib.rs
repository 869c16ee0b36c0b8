pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{DataSourceError, EventSource, GraphQlEventSource, MockEventSource};
pub use domain::{
    Address, Amount, Bounty, BountyStatus, Decimal, Domain, EntityId, FundStatus, Metric,
    RawAmount, StudyFund, TimeSec,
};
pub use engine::{AllowanceSnapshot, DerivedMetrics, TimeRemaining};
pub use error::AppError;
pub use orchestration::{project_streams, EventFetcher, EventFilter, ProjectionBatch, Projector};
