//! Change-log store contract.
//!
//! A store is an opaque transactional event log. The rebaser relies only on:
//! - predicate-filtered fetches (events up to a global count, changes of events)
//! - counts of changes by scope and type
//! - atomic multi-record commit
//!
//! Every read and write of one rebase goes through a single `LogTransaction`;
//! dropping a transaction without committing rolls it back.

use crate::error::StoreError;
use synclog_core::{
    ChangeCounts, ChangeType, EventDraft, EventId, ModificationEvent, ObjectChange,
    RevisionVector,
};

/// Which events a change count considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeScope {
    /// Every event, baseline included
    #[default]
    All,
    /// Only the baseline
    BaselineOnly,
    /// Regular events only
    ExcludeBaseline,
}

/// Predicate for counting object changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFilter {
    /// Events considered
    pub scope: ChangeScope,
    /// Restrict to one change type
    pub change_type: Option<ChangeType>,
}

impl ChangeFilter {
    /// All changes held by the baseline.
    #[must_use]
    pub fn baseline() -> Self {
        Self {
            scope: ChangeScope::BaselineOnly,
            change_type: None,
        }
    }

    /// Changes of one type outside the baseline.
    #[must_use]
    pub fn non_baseline(change_type: ChangeType) -> Self {
        Self {
            scope: ChangeScope::ExcludeBaseline,
            change_type: Some(change_type),
        }
    }

    /// Check whether a change held by an event of the given kind matches.
    #[must_use]
    pub fn matches(&self, is_baseline: bool, change_type: ChangeType) -> bool {
        let scope_ok = match self.scope {
            ChangeScope::All => true,
            ChangeScope::BaselineOnly => is_baseline,
            ChangeScope::ExcludeBaseline => !is_baseline,
        };
        scope_ok && self.change_type.map_or(true, |wanted| wanted == change_type)
    }
}

/// A durable, transactional change log.
pub trait ChangeLogStore: Send {
    /// Transaction type borrowing the store.
    type Transaction<'a>: LogTransaction
    where
        Self: 'a;

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot open a transaction.
    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Append a regular event with its changes, committing immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the event cannot be persisted.
    fn append(&mut self, draft: EventDraft) -> Result<EventId, StoreError>;

    /// Check whether a baseline exists.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn has_baseline(&self) -> Result<bool, StoreError>;

    /// Count object changes matching a filter.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_changes(&self, filter: ChangeFilter) -> Result<u64, StoreError>;

    /// Count regular events.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_events(&self) -> Result<u64, StoreError>;

    /// Merge of every event's revision vector, baseline included.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn latest_revisions(&self) -> Result<RevisionVector, StoreError>;

    /// Number of changes held by the baseline.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_of_baseline(&self) -> Result<u64, StoreError> {
        self.count_changes(ChangeFilter::baseline())
    }

    /// Number of changes of one type outside the baseline.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_of_non_baseline_changes_of_type(
        &self,
        change_type: ChangeType,
    ) -> Result<u64, StoreError> {
        self.count_changes(ChangeFilter::non_baseline(change_type))
    }

    /// All counts feeding the compaction estimate.
    ///
    /// # Errors
    ///
    /// Returns error if any count fails.
    fn change_counts(&self) -> Result<ChangeCounts, StoreError> {
        Ok(ChangeCounts {
            baseline: self.count_of_baseline()?,
            inserts: self.count_of_non_baseline_changes_of_type(ChangeType::Insert)?,
            updates: self.count_of_non_baseline_changes_of_type(ChangeType::Update)?,
            deletes: self.count_of_non_baseline_changes_of_type(ChangeType::Delete)?,
        })
    }
}

/// Operations available inside one change-log transaction.
pub trait LogTransaction {
    /// Load the baseline, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn fetch_baseline(&self) -> Result<Option<ModificationEvent>, StoreError>;

    /// Create an empty baseline.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateBaseline` if one exists already.
    fn create_baseline(&mut self, model_version: &str) -> Result<ModificationEvent, StoreError>;

    /// Merge of every event's revision vector, baseline included.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn latest_revisions(&self) -> Result<RevisionVector, StoreError>;

    /// Regular events with a global count at or below `global_count`, in
    /// event order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn fetch_events_up_to(&self, global_count: u64) -> Result<Vec<ModificationEvent>, StoreError>;

    /// Hint that the changes of `events` will be fetched next.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails while batching.
    fn prefetch_changes(&self, _events: &[ModificationEvent]) -> Result<(), StoreError> {
        Ok(())
    }

    /// Changes owned by the given events, in the order of `events` and then
    /// in insertion order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn fetch_changes(&self, events: &[EventId]) -> Result<Vec<ObjectChange>, StoreError>;

    /// Persist the baseline's fields and replace its change set.
    ///
    /// # Errors
    ///
    /// Returns error if the baseline does not exist or the write fails.
    fn update_baseline(
        &mut self,
        baseline: &ModificationEvent,
        changes: &[ObjectChange],
    ) -> Result<(), StoreError>;

    /// Delete a regular event and its changes.
    ///
    /// # Errors
    ///
    /// Returns error if the event does not exist or the write fails.
    fn delete_event(&mut self, id: EventId) -> Result<(), StoreError>;

    /// Commit every write of this transaction atomically.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is persisted then.
    fn commit(self) -> Result<(), StoreError>;
}
