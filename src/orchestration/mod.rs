//! Async coordination: fan-out fetch and per-request projection.

pub mod fetch;
pub mod projector;

pub use fetch::{EventFetcher, EventFilter, FetchError};
pub use projector::{
    project_streams, BatchOf, Projection, ProjectionBatch, ProjectionError, ProjectionOf,
    ProjectionReport, Projector,
};
