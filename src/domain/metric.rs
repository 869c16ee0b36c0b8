//! A numeric projection that may be unknown.

use serde::Serialize;

/// Value of a derived metric, or the marker that it could not be computed.
///
/// `Unavailable` is distinct from zero: a malformed amount in one event makes
/// the metric that depends on it unknown, while the rest of the projection
/// proceeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Metric<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Metric<T> {
    pub fn available(value: T) -> Self {
        Metric::Available { value }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Metric::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Metric::Available { value } => Some(value),
            Metric::Unavailable { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metric<U> {
        match self {
            Metric::Available { value } => Metric::Available { value: f(value) },
            Metric::Unavailable { reason } => Metric::Unavailable { reason },
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Metric<U>) -> Metric<U> {
        match self {
            Metric::Available { value } => f(value),
            Metric::Unavailable { reason } => Metric::Unavailable { reason },
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Metric<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Metric::available(value),
            Err(e) => Metric::unavailable(e.to_string()),
        }
    }
}
