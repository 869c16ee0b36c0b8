//! Per-entity aggregate of every observed event.

use crate::domain::{EntityId, EventKind, EventRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// One entity: its creation record plus, for every registered kind, all
/// distinct events of that kind (possibly none).
///
/// Built fresh on every projection cycle and never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAggregate<C, K> {
    pub created: C,
    /// Events per kind, oldest first, ties broken by event key.
    pub events: BTreeMap<K, Vec<EventRecord<K>>>,
}

impl<C, K: EventKind> EntityAggregate<C, K> {
    pub fn new(created: C, kinds: &[K]) -> Self {
        Self {
            created,
            events: kinds.iter().map(|k| (*k, Vec::new())).collect(),
        }
    }

    pub fn has(&self, kind: K) -> bool {
        self.events.get(&kind).is_some_and(|v| !v.is_empty())
    }

    pub fn events(&self, kind: K) -> &[EventRecord<K>] {
        self.events.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, kind: K) -> usize {
        self.events(kind).len()
    }

    /// Total number of non-creation events across all kinds.
    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// An entity id referenced by non-creation events only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Orphan {
    pub entity_id: EntityId,
    /// Wire names of the kinds that referenced it.
    pub kinds: Vec<&'static str>,
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounty::BountyKind;
    use crate::domain::{EventRecord, TimeSec};

    #[test]
    fn new_aggregate_has_every_kind_empty() {
        let agg: EntityAggregate<(), BountyKind> = EntityAggregate::new(
            (),
            &[BountyKind::Claimed, BountyKind::Completed],
        );
        assert_eq!(agg.events.len(), 2);
        assert!(!agg.has(BountyKind::Claimed));
        assert_eq!(agg.events(BountyKind::Cancelled).len(), 0);
        assert_eq!(agg.event_count(), 0);
    }

    #[test]
    fn has_reports_presence() {
        let mut agg: EntityAggregate<(), BountyKind> =
            EntityAggregate::new((), &[BountyKind::Claimed]);
        agg.events
            .get_mut(&BountyKind::Claimed)
            .unwrap()
            .push(EventRecord::new(
                BountyKind::Claimed,
                EntityId::new("1"),
                None,
                None,
                Some(TimeSec::new(1)),
                None,
            ));
        assert!(agg.has(BountyKind::Claimed));
        assert_eq!(agg.count(BountyKind::Claimed), 1);
    }
}
