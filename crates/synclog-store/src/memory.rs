//! In-memory change-log store.
//!
//! A transaction works on a copy of the log state which replaces the store
//! state only when the commit succeeds, so readers never see a partial
//! rebase. A `FaultPlan` injects read or commit failures for tests.

use crate::error::StoreError;
use crate::store::{ChangeFilter, ChangeLogStore, LogTransaction};
use std::cell::Cell;
use std::collections::BTreeMap;
use synclog_core::{EventDraft, EventId, ModificationEvent, ObjectChange, RevisionVector};

/// Failures to inject into the next operations of a `MemoryStore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail the next read, counts included
    pub fail_next_read: bool,
    /// Fail the next commit
    pub fail_next_commit: bool,
}

#[derive(Debug, Clone, Default)]
struct LogState {
    next_id: u64,
    events: BTreeMap<EventId, ModificationEvent>,
    changes: BTreeMap<EventId, Vec<ObjectChange>>,
}

impl LogState {
    fn allocate_id(&mut self) -> EventId {
        self.next_id += 1;
        EventId(self.next_id)
    }

    fn baseline(&self) -> Option<&ModificationEvent> {
        self.events.values().find(|event| event.is_baseline())
    }

    fn latest_revisions(&self) -> RevisionVector {
        RevisionVector::merge_max(self.events.values().map(|event| &event.revisions))
    }

    fn count_changes(&self, filter: ChangeFilter) -> u64 {
        let count = self
            .changes
            .iter()
            .filter_map(|(id, changes)| {
                self.events
                    .get(id)
                    .map(|event| (event.is_baseline(), changes))
            })
            .flat_map(|(is_baseline, changes)| {
                changes
                    .iter()
                    .filter(move |change| filter.matches(is_baseline, change.change_type))
            })
            .count();
        count as u64
    }
}

/// Change log held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: LogState,
    faults: Cell<FaultPlan>,
}

impl MemoryStore {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm failures for upcoming operations.
    pub fn inject(&mut self, faults: FaultPlan) {
        self.faults.set(faults);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        let mut faults = self.faults.get();
        if faults.fail_next_read {
            faults.fail_next_read = false;
            self.faults.set(faults);
            return Err(StoreError::Injected("read"));
        }
        Ok(())
    }

    /// Snapshot of every event, baseline included, in event order.
    #[must_use]
    pub fn events(&self) -> Vec<ModificationEvent> {
        let mut events: Vec<_> = self.state.events.values().cloned().collect();
        events.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
        events
    }

    /// Changes owned by one event.
    #[must_use]
    pub fn changes_of(&self, id: EventId) -> Vec<ObjectChange> {
        self.state.changes.get(&id).cloned().unwrap_or_default()
    }
}

impl ChangeLogStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<MemoryTransaction<'_>, StoreError> {
        let working = self.state.clone();
        Ok(MemoryTransaction {
            store: self,
            working,
        })
    }

    fn append(&mut self, draft: EventDraft) -> Result<EventId, StoreError> {
        let id = self.state.allocate_id();
        let (event, changes) = ModificationEvent::from_draft(id, draft);
        self.state.events.insert(id, event);
        self.state.changes.insert(id, changes);
        Ok(id)
    }

    fn has_baseline(&self) -> Result<bool, StoreError> {
        self.check_read()?;
        Ok(self.state.baseline().is_some())
    }

    fn count_changes(&self, filter: ChangeFilter) -> Result<u64, StoreError> {
        self.check_read()?;
        Ok(self.state.count_changes(filter))
    }

    fn count_events(&self) -> Result<u64, StoreError> {
        self.check_read()?;
        let count = self
            .state
            .events
            .values()
            .filter(|event| !event.is_baseline())
            .count();
        Ok(count as u64)
    }

    fn latest_revisions(&self) -> Result<RevisionVector, StoreError> {
        self.check_read()?;
        Ok(self.state.latest_revisions())
    }
}

/// Transaction over a `MemoryStore`.
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    working: LogState,
}

impl MemoryTransaction<'_> {
    fn check_read(&self) -> Result<(), StoreError> {
        self.store.check_read()
    }
}

impl LogTransaction for MemoryTransaction<'_> {
    fn fetch_baseline(&self) -> Result<Option<ModificationEvent>, StoreError> {
        self.check_read()?;
        Ok(self.working.baseline().cloned())
    }

    fn create_baseline(&mut self, model_version: &str) -> Result<ModificationEvent, StoreError> {
        if self.working.baseline().is_some() {
            return Err(StoreError::DuplicateBaseline);
        }
        let id = self.working.allocate_id();
        let baseline = ModificationEvent::new_baseline(id, model_version);
        self.working.events.insert(id, baseline.clone());
        self.working.changes.insert(id, Vec::new());
        Ok(baseline)
    }

    fn latest_revisions(&self) -> Result<RevisionVector, StoreError> {
        self.check_read()?;
        Ok(self.working.latest_revisions())
    }

    fn fetch_events_up_to(&self, global_count: u64) -> Result<Vec<ModificationEvent>, StoreError> {
        self.check_read()?;
        let mut events: Vec<_> = self
            .working
            .events
            .values()
            .filter(|event| !event.is_baseline() && event.global_count <= global_count)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
        Ok(events)
    }

    fn fetch_changes(&self, events: &[EventId]) -> Result<Vec<ObjectChange>, StoreError> {
        self.check_read()?;
        let mut changes = Vec::new();
        for id in events {
            let owned = self
                .working
                .changes
                .get(id)
                .ok_or(StoreError::MissingEvent(*id))?;
            changes.extend(owned.iter().cloned());
        }
        Ok(changes)
    }

    fn update_baseline(
        &mut self,
        baseline: &ModificationEvent,
        changes: &[ObjectChange],
    ) -> Result<(), StoreError> {
        let stored = self
            .working
            .events
            .get_mut(&baseline.id)
            .filter(|event| event.is_baseline())
            .ok_or(StoreError::MissingEvent(baseline.id))?;
        *stored = baseline.clone();
        self.working.changes.insert(baseline.id, changes.to_vec());
        Ok(())
    }

    fn delete_event(&mut self, id: EventId) -> Result<(), StoreError> {
        self.working
            .events
            .remove(&id)
            .ok_or(StoreError::MissingEvent(id))?;
        self.working.changes.remove(&id);
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let mut faults = self.store.faults.get();
        if faults.fail_next_commit {
            faults.fail_next_commit = false;
            self.store.faults.set(faults);
            return Err(StoreError::Injected("commit"));
        }
        self.store.state = self.working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synclog_core::{ChangeType, Revision};

    fn draft(replica: &str, number: u64, changes: Vec<ObjectChange>) -> EventDraft {
        EventDraft::new(Revision::new(replica, number, number), "1", changes)
    }

    #[test]
    fn append_and_count() {
        let mut store = MemoryStore::new();
        store
            .append(draft(
                "a",
                1,
                vec![
                    ObjectChange::insert("Note", "n1", json!({})),
                    ObjectChange::delete("Note", "n0"),
                ],
            ))
            .unwrap();

        assert_eq!(store.count_events().unwrap(), 1);
        assert_eq!(store.count_of_baseline().unwrap(), 0);
        assert_eq!(
            store
                .count_of_non_baseline_changes_of_type(ChangeType::Delete)
                .unwrap(),
            1
        );
        assert!(!store.has_baseline().unwrap());
    }

    #[test]
    fn uncommitted_transaction_rolls_back() {
        let mut store = MemoryStore::new();
        let id = store.append(draft("a", 1, vec![])).unwrap();

        {
            let mut tx = store.begin().unwrap();
            tx.create_baseline("1").unwrap();
            tx.delete_event(id).unwrap();
        }

        assert!(!store.has_baseline().unwrap());
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn injected_commit_failure_discards_writes() {
        let mut store = MemoryStore::new();
        let id = store.append(draft("a", 1, vec![])).unwrap();
        store.inject(FaultPlan {
            fail_next_commit: true,
            ..FaultPlan::default()
        });

        let mut tx = store.begin().unwrap();
        tx.delete_event(id).unwrap();
        assert!(matches!(tx.commit(), Err(StoreError::Injected("commit"))));
        assert_eq!(store.count_events().unwrap(), 1);

        let mut tx = store.begin().unwrap();
        tx.delete_event(id).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.count_events().unwrap(), 0);
    }

    #[test]
    fn injected_read_failure_hits_counts_once() {
        let mut store = MemoryStore::new();
        store.append(draft("a", 1, vec![])).unwrap();
        store.inject(FaultPlan {
            fail_next_read: true,
            ..FaultPlan::default()
        });

        assert!(matches!(
            store.count_of_baseline(),
            Err(StoreError::Injected("read"))
        ));
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn second_baseline_rejected() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.create_baseline("1").unwrap();
        assert!(matches!(
            tx.create_baseline("1"),
            Err(StoreError::DuplicateBaseline)
        ));
    }

    #[test]
    fn events_up_to_are_ordered() {
        let mut store = MemoryStore::new();
        store.append(draft("b", 1, vec![])).unwrap();
        store.append(draft("a", 2, vec![])).unwrap();
        store.append(draft("a", 1, vec![])).unwrap();

        let tx = store.begin().unwrap();
        let events = tx.fetch_events_up_to(1).unwrap();
        let replicas: Vec<_> = events
            .iter()
            .map(|e| e.origin().unwrap().replica_id.as_str())
            .collect();
        assert_eq!(replicas, vec!["a", "b"]);
    }
}
