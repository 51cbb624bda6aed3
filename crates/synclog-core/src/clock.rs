//! Per-replica Lamport clock for the append path.
//!
//! Each appended event receives:
//! - the next replica-local revision number
//! - a global count one past the largest global count the replica has seen
//!
//! Replicas that never observe each other emit overlapping global counts;
//! the event ordering key breaks those ties by replica identifier.

use crate::revision::{Revision, RevisionVector};

/// Lamport clock state machine for a single replica.
#[derive(Debug, Clone)]
pub struct LamportClock {
    /// Last revision handed out by this clock
    last: Revision,
}

impl LamportClock {
    /// Create a clock for a replica that has not appended anything yet.
    #[must_use]
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            last: Revision::new(replica_id, 0, 0),
        }
    }

    /// Resume a clock from the last revision the replica appended.
    #[must_use]
    pub fn resume(latest: Revision) -> Self {
        Self { last: latest }
    }

    /// Resume a clock from the newest revision a vector records for the
    /// replica, observing every other replica's global count.
    #[must_use]
    pub fn from_vector(replica_id: &str, vector: &RevisionVector) -> Self {
        let mut clock = match vector.revision_for(replica_id) {
            Some(latest) => Self::resume(latest.clone()),
            None => Self::new(replica_id),
        };
        for revision in vector.iter() {
            clock.observe(revision.global_count);
        }
        clock
    }

    /// Get the replica this clock belongs to.
    #[must_use]
    pub fn replica_id(&self) -> &str {
        &self.last.replica_id
    }

    /// Generate the revision for a new local event.
    ///
    /// Both counters are strictly greater than anything previously
    /// generated or observed.
    pub fn tick(&mut self) -> Revision {
        self.last.revision_number = self.last.revision_number.saturating_add(1);
        self.last.global_count = self.last.global_count.saturating_add(1);
        self.last.clone()
    }

    /// Advance past a global count seen on another replica's event.
    pub fn observe(&mut self, global_count: u64) {
        if global_count > self.last.global_count {
            self.last.global_count = global_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic() {
        let mut clock = LamportClock::new("a");

        let r1 = clock.tick();
        let r2 = clock.tick();

        assert_eq!(r1, Revision::new("a", 1, 1));
        assert_eq!(r2, Revision::new("a", 2, 2));
    }

    #[test]
    fn observe_advances_global_count_only() {
        let mut clock = LamportClock::new("a");
        clock.tick();

        clock.observe(10);
        let next = clock.tick();

        assert_eq!(next.revision_number, 2);
        assert_eq!(next.global_count, 11);
    }

    #[test]
    fn observe_never_goes_backwards() {
        let mut clock = LamportClock::new("a");
        clock.observe(10);
        clock.observe(3);

        assert_eq!(clock.tick().global_count, 11);
    }

    #[test]
    fn resume_from_vector() {
        let vector = RevisionVector::from_revisions([
            Revision::new("a", 4, 6),
            Revision::new("b", 9, 12),
        ]);

        let mut clock = LamportClock::from_vector("a", &vector);
        assert_eq!(clock.replica_id(), "a");
        assert_eq!(clock.tick(), Revision::new("a", 5, 13));

        let mut fresh = LamportClock::from_vector("c", &vector);
        assert_eq!(fresh.tick(), Revision::new("c", 1, 13));
    }
}
