//! Pure projection engine: aggregation, status resolution and metrics.
//!
//! Nothing here performs I/O or reads the clock; `now` is always an input.

pub mod aggregator;
pub mod metrics;
pub mod resolver;

pub use aggregator::{
    aggregate, Aggregation, AggregationError, AggregationOf, EventStreams, StreamsOf,
};
pub use metrics::{AllowanceSnapshot, DerivedMetrics, KindTotal, MetricsOf, TimeRemaining};
pub use resolver::{resolve, Anomaly, Resolution};
