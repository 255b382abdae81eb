use std::collections::HashMap;

use shared::{
    domain::RequestId,
    protocol::{RequestRecord, StreamEvent},
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    /// Same rank, same value: nothing to redraw.
    Unchanged,
    /// Lower rank than what is already known.
    Discarded,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// Canonical set of requests for one view, keyed by id.
///
/// Every observation (snapshot row, stream event, command response) goes
/// through [`RequestCollection::merge`]. A record only ever replaces one with
/// the same id when its status rank is at least as high, so the final state
/// does not depend on arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCollection {
    records: HashMap<RequestId, RequestRecord>,
}

impl RequestCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RequestId) -> Option<&RequestRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &RequestRecord> {
        self.records.values()
    }

    pub fn merge(&mut self, record: RequestRecord) -> MergeOutcome {
        match self.records.get_mut(&record.id) {
            None => {
                self.records.insert(record.id, record);
                MergeOutcome::Inserted
            }
            Some(existing) if record.rank() < existing.rank() => MergeOutcome::Discarded,
            Some(existing) if *existing == record => MergeOutcome::Unchanged,
            Some(existing) => {
                // Winner replaces wholesale, losers are never field-merged.
                *existing = record;
                MergeOutcome::Replaced
            }
        }
    }

    /// Merges a batch and reports how many records changed.
    pub fn merge_all(&mut self, records: impl IntoIterator<Item = RequestRecord>) -> usize {
        records
            .into_iter()
            .map(|record| self.merge(record))
            .filter(|outcome| outcome.changed())
            .count()
    }

    /// Merges store snapshot rows, skipping rows that fail
    /// [`RequestRecord::validate`]. Returns how many records changed.
    pub fn merge_snapshot(&mut self, records: impl IntoIterator<Item = RequestRecord>) -> usize {
        let valid = records.into_iter().filter(|record| match record.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!(request_id = record.id.0, %reason, "reconcile: skipping invalid snapshot row");
                false
            }
        });
        self.merge_all(valid)
    }

    pub fn from_snapshot(records: impl IntoIterator<Item = RequestRecord>) -> Self {
        let mut collection = Self::new();
        collection.merge_snapshot(records);
        collection
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl FromIterator<RequestRecord> for RequestCollection {
    fn from_iter<I: IntoIterator<Item = RequestRecord>>(iter: I) -> Self {
        let mut collection = Self::new();
        collection.merge_all(iter);
        collection
    }
}

/// Pure reducer form of [`RequestCollection::merge`].
pub fn reconcile(mut collection: RequestCollection, event: StreamEvent) -> RequestCollection {
    collection.merge(event.into_record());
    collection
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
