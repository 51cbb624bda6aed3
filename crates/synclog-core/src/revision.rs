//! Revisions and revision vectors.
//!
//! A revision identifies one event appended by one replica:
//! - the replica identifier (opaque string)
//! - the replica-local revision number, which only ever increases
//! - the global counter value the event was appended at
//!
//! A revision vector records, per replica, the newest revision that a given
//! event (or the baseline) reflects.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// The position of one replica's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    /// Identifier of the replica that appended the event
    pub replica_id: String,
    /// Replica-local monotonic event counter
    pub revision_number: u64,
    /// Global counter of the event carrying this revision
    pub global_count: u64,
}

impl Revision {
    /// Create a new revision.
    #[must_use]
    pub fn new(replica_id: impl Into<String>, revision_number: u64, global_count: u64) -> Self {
        Self {
            replica_id: replica_id.into(),
            revision_number,
            global_count,
        }
    }

    /// Compare two revisions of the same replica.
    ///
    /// The revision number decides; the global count only breaks ties so
    /// that merging stays deterministic.
    #[must_use]
    pub fn progress_cmp(&self, other: &Self) -> Ordering {
        self.revision_number
            .cmp(&other.revision_number)
            .then(self.global_count.cmp(&other.global_count))
    }
}

/// Mapping from replica identifier to that replica's newest known revision.
///
/// Holds at most one entry per replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionVector {
    entries: BTreeMap<String, Revision>,
}

impl RevisionVector {
    /// Create an empty revision vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a vector from revisions, keeping the newest per replica.
    pub fn from_revisions(revisions: impl IntoIterator<Item = Revision>) -> Self {
        let mut vector = Self::new();
        for revision in revisions {
            vector.insert(revision);
        }
        vector
    }

    /// Look up the revision recorded for a replica.
    #[must_use]
    pub fn revision_for(&self, replica_id: &str) -> Option<&Revision> {
        self.entries.get(replica_id)
    }

    /// Record a revision, keeping whichever of the existing and new entry is
    /// further along.
    ///
    /// Returns `true` if the vector changed.
    pub fn insert(&mut self, revision: Revision) -> bool {
        match self.entries.get_mut(&revision.replica_id) {
            Some(existing) => {
                if revision.progress_cmp(existing) == Ordering::Greater {
                    *existing = revision;
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.insert(revision.replica_id.clone(), revision);
                true
            }
        }
    }

    /// Merge another vector into this one (store-wise maximum).
    pub fn merge(&mut self, other: &RevisionVector) {
        for revision in other.entries.values() {
            self.insert(revision.clone());
        }
    }

    /// Component-wise maximum across all given vectors.
    ///
    /// Replicas missing from an input are skipped for that input.
    pub fn merge_max<'a>(vectors: impl IntoIterator<Item = &'a RevisionVector>) -> RevisionVector {
        let mut merged = RevisionVector::new();
        for vector in vectors {
            merged.merge(vector);
        }
        merged
    }

    /// Iterate over the recorded revisions in replica order.
    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.entries.values()
    }

    /// Number of replicas tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no replica is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a revision is already reflected by this vector.
    #[must_use]
    pub fn covers(&self, revision: &Revision) -> bool {
        self.revision_for(&revision.replica_id)
            .is_some_and(|known| known.revision_number >= revision.revision_number)
    }
}

impl FromIterator<Revision> for RevisionVector {
    fn from_iter<I: IntoIterator<Item = Revision>>(iter: I) -> Self {
        Self::from_revisions(iter)
    }
}
