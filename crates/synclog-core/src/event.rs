//! Change-log data model.
//!
//! The log holds modification events:
//! - regular events, appended by replicas, each carrying its own revision
//! - at most one baseline event, the cumulative fold of all compacted history
//!
//! Each event owns a set of object changes; deleting the event deletes them.

use crate::revision::{Revision, RevisionVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of modification an object change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// The object was created
    Insert,
    /// The object was modified
    Update,
    /// The object was removed
    Delete,
}

impl ChangeType {
    /// All change types, in code order.
    pub const ALL: [ChangeType; 3] = [ChangeType::Insert, ChangeType::Update, ChangeType::Delete];

    /// Stable integer code used by persistent backends.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            ChangeType::Insert => 0,
            ChangeType::Update => 1,
            ChangeType::Delete => 2,
        }
    }

    /// Decode a persistent integer code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ChangeType::Insert),
            1 => Some(ChangeType::Update),
            2 => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "insert"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(ChangeType::Insert),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            other => Err(format!("unknown change type '{other}'")),
        }
    }
}

/// One logical object's insert, update, or delete within an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    /// Global identifier of the changed object
    pub object_id: String,
    /// Entity (table / type) name of the object
    pub entity: String,
    /// Kind of change
    pub change_type: ChangeType,
    /// Changed property values
    pub properties: serde_json::Value,
}

impl ObjectChange {
    /// Create a new object change.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        object_id: impl Into<String>,
        change_type: ChangeType,
        properties: serde_json::Value,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            entity: entity.into(),
            change_type,
            properties,
        }
    }

    /// Insert of an object with the given properties.
    #[must_use]
    pub fn insert(
        entity: impl Into<String>,
        object_id: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        Self::new(entity, object_id, ChangeType::Insert, properties)
    }

    /// Update of an object with the given properties.
    #[must_use]
    pub fn update(
        entity: impl Into<String>,
        object_id: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        Self::new(entity, object_id, ChangeType::Update, properties)
    }

    /// Deletion of an object.
    #[must_use]
    pub fn delete(entity: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self::new(entity, object_id, ChangeType::Delete, serde_json::Value::Null)
    }
}

/// Store-assigned identifier of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether an event is a regular replica event or the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// An event appended by a replica, with its own revision
    Regular(Revision),
    /// The cumulative fold of all compacted events
    Baseline,
}

/// An event in the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationEvent {
    /// Store-assigned identifier
    pub id: EventId,
    /// Regular event or baseline
    pub kind: EventKind,
    /// Global counter; `0` for a baseline that has never been rebased
    pub global_count: u64,
    /// Creation time (last rebase time for the baseline)
    pub timestamp: DateTime<Utc>,
    /// Data model version the changes were recorded against
    pub model_version: String,
    /// Newest revision per replica reflected by this event or earlier ones
    pub revisions: RevisionVector,
}

impl ModificationEvent {
    /// Create an empty, never-rebased baseline.
    #[must_use]
    pub fn new_baseline(id: EventId, model_version: impl Into<String>) -> Self {
        Self {
            id,
            kind: EventKind::Baseline,
            global_count: 0,
            timestamp: Utc::now(),
            model_version: model_version.into(),
            revisions: RevisionVector::new(),
        }
    }

    /// Materialize a draft once the store has assigned an identifier.
    #[must_use]
    pub fn from_draft(id: EventId, draft: EventDraft) -> (Self, Vec<ObjectChange>) {
        let event = Self {
            id,
            global_count: draft.revision.global_count,
            kind: EventKind::Regular(draft.revision),
            timestamp: draft.timestamp,
            model_version: draft.model_version,
            revisions: draft.revisions,
        };
        (event, draft.changes)
    }

    /// Check if this is the baseline event.
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        matches!(self.kind, EventKind::Baseline)
    }

    /// The revision that produced a regular event.
    #[must_use]
    pub fn origin(&self) -> Option<&Revision> {
        match &self.kind {
            EventKind::Regular(revision) => Some(revision),
            EventKind::Baseline => None,
        }
    }

    /// Total ordering key: global count, then replica, then revision number.
    ///
    /// The baseline sorts before any regular event sharing its global count.
    #[must_use]
    pub fn ordering_key(&self) -> (u64, &str, u64) {
        match &self.kind {
            EventKind::Regular(revision) => (
                self.global_count,
                revision.replica_id.as_str(),
                revision.revision_number,
            ),
            EventKind::Baseline => (self.global_count, "", 0),
        }
    }
}

/// A regular event ready to be appended to a log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Revision of the appending replica for this event
    pub revision: Revision,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Data model version
    pub model_version: String,
    /// Revision vector; always includes `revision`
    pub revisions: RevisionVector,
    /// Object changes carried by the event
    pub changes: Vec<ObjectChange>,
}

impl EventDraft {
    /// Create a draft for a replica that has observed nothing but itself.
    #[must_use]
    pub fn new(
        revision: Revision,
        model_version: impl Into<String>,
        changes: Vec<ObjectChange>,
    ) -> Self {
        Self {
            revisions: RevisionVector::from_revisions([revision.clone()]),
            revision,
            timestamp: Utc::now(),
            model_version: model_version.into(),
            changes,
        }
    }

    /// Record the revisions the replica had observed when appending.
    #[must_use]
    pub fn with_observed(mut self, observed: &RevisionVector) -> Self {
        self.revisions.merge(observed);
        self.revisions.insert(self.revision.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_type_codes_roundtrip() {
        for change_type in ChangeType::ALL {
            assert_eq!(ChangeType::from_code(change_type.code()), Some(change_type));
            assert_eq!(change_type.to_string().parse::<ChangeType>(), Ok(change_type));
        }
        assert_eq!(ChangeType::from_code(7), None);
        assert!("upsert".parse::<ChangeType>().is_err());
    }

    #[test]
    fn draft_vector_includes_own_revision() {
        let observed = RevisionVector::from_revisions([Revision::new("b", 3, 3)]);
        let draft = EventDraft::new(Revision::new("a", 1, 4), "1", vec![]).with_observed(&observed);

        assert_eq!(draft.revisions.len(), 2);
        assert_eq!(draft.revisions.revision_for("a"), Some(&Revision::new("a", 1, 4)));
    }

    #[test]
    fn event_from_draft() {
        let draft = EventDraft::new(
            Revision::new("a", 2, 5),
            "1",
            vec![ObjectChange::insert("Note", "n1", json!({"title": "x"}))],
        );

        let (event, changes) = ModificationEvent::from_draft(EventId(9), draft);
        assert_eq!(event.global_count, 5);
        assert!(!event.is_baseline());
        assert_eq!(event.origin().map(|r| r.revision_number), Some(2));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn ordering_key_breaks_global_count_ties() {
        let (a, _) = ModificationEvent::from_draft(
            EventId(2),
            EventDraft::new(Revision::new("a", 1, 1), "1", vec![]),
        );
        let (b, _) = ModificationEvent::from_draft(
            EventId(1),
            EventDraft::new(Revision::new("b", 1, 1), "1", vec![]),
        );
        let baseline = ModificationEvent::new_baseline(EventId(3), "1");

        assert!(a.ordering_key() < b.ordering_key());
        assert!(baseline.ordering_key() < a.ordering_key());
    }
}
