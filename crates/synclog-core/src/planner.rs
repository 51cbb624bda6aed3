//! Compaction planning.
//!
//! Decides where the safe compaction boundary lies across all known replicas
//! and whether folding events into the baseline is worth the cost.
//!
//! # Safe threshold
//!
//! | Replica state | Effect |
//! |---------------|--------|
//! | Not in baseline, or advanced past it | Its latest global count bounds the threshold |
//! | At or behind the baseline's revision | Stale, excluded (it must re-sync from scratch) |
//!
//! The threshold is the minimum bound; with no bound there is nothing safe
//! to fold.

use crate::revision::RevisionVector;

/// Default ratio above which an existing baseline is worth rebasing.
pub const DEFAULT_MIN_RATIO: f64 = 0.5;

/// Change counts feeding the compaction estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    /// Changes already folded into the baseline
    pub baseline: u64,
    /// Insert changes outside the baseline
    pub inserts: u64,
    /// Update changes outside the baseline
    pub updates: u64,
    /// Delete changes outside the baseline
    pub deletes: u64,
}

impl ChangeCounts {
    /// Total number of changes outside the baseline.
    #[must_use]
    pub fn non_baseline(&self) -> u64 {
        self.inserts
            .saturating_add(self.updates)
            .saturating_add(self.deletes)
    }
}

/// Compaction planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPlanner {
    min_ratio: f64,
}

impl Default for CompactionPlanner {
    fn default() -> Self {
        Self {
            min_ratio: DEFAULT_MIN_RATIO,
        }
    }
}

impl CompactionPlanner {
    /// Create a planner rebasing existing baselines above `min_ratio`.
    ///
    /// The ratio is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(min_ratio: f64) -> Self {
        Self {
            min_ratio: if min_ratio.is_nan() {
                DEFAULT_MIN_RATIO
            } else {
                min_ratio.clamp(0.0, 1.0)
            },
        }
    }

    /// Get the configured minimum ratio.
    #[must_use]
    pub fn min_ratio(&self) -> f64 {
        self.min_ratio
    }

    /// Compute the global count at or below which events may be folded.
    ///
    /// Returns `None` if every replica is stale relative to the baseline or
    /// `current` is empty.
    #[must_use]
    pub fn compute_safe_threshold(
        &self,
        current: &RevisionVector,
        baseline: &RevisionVector,
    ) -> Option<u64> {
        current
            .iter()
            .filter(|revision| {
                let stale = baseline
                    .revision_for(&revision.replica_id)
                    .is_some_and(|recorded| recorded.revision_number >= revision.revision_number);
                if stale {
                    tracing::debug!(
                        replica_id = %revision.replica_id,
                        revision_number = revision.revision_number,
                        "Replica has not advanced past baseline, excluding"
                    );
                }
                !stale
            })
            .map(|revision| revision.global_count)
            .min()
    }

    /// Estimate the fraction of stored change volume a rebase would remove.
    ///
    /// A delete cancels itself and the record it removes, an update replaces
    /// a prior state, an insert adds one record. The result lies in `[0, 1]`
    /// and is `0` when there is nothing outside the baseline.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_compaction_ratio(&self, counts: ChangeCounts) -> f64 {
        if counts.non_baseline() == 0 {
            return 0.0;
        }

        let baseline = counts.baseline as f64;
        let inserts = counts.inserts as f64;
        let updates = counts.updates as f64;
        let deletes = counts.deletes as f64;

        let projected = baseline - 2.0 * deletes - updates + inserts;
        let current = (baseline + deletes + inserts + updates).max(1.0);

        (1.0 - projected / current).clamp(0.0, 1.0)
    }

    /// Decide whether a rebase is worthwhile.
    ///
    /// Always true when no baseline exists yet.
    #[must_use]
    pub fn should_rebase(&self, has_baseline: bool, estimated_ratio: f64) -> bool {
        !has_baseline || estimated_ratio > self.min_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::Revision;

    fn vector(entries: &[(&str, u64, u64)]) -> RevisionVector {
        entries
            .iter()
            .map(|(replica, number, global)| Revision::new(*replica, *number, *global))
            .collect()
    }

    #[test]
    fn threshold_is_minimum_global_count() {
        let planner = CompactionPlanner::default();
        let current = vector(&[("a", 10, 10), ("b", 4, 14), ("c", 7, 12)]);

        assert_eq!(
            planner.compute_safe_threshold(&current, &RevisionVector::new()),
            Some(10)
        );
    }

    #[test]
    fn threshold_excludes_stale_replicas() {
        let planner = CompactionPlanner::default();
        let baseline = vector(&[("a", 5, 5), ("b", 5, 5)]);
        let current = vector(&[("a", 5, 5), ("b", 8, 8)]);

        assert_eq!(planner.compute_safe_threshold(&current, &baseline), Some(8));
    }

    #[test]
    fn threshold_none_when_all_stale() {
        let planner = CompactionPlanner::default();
        let baseline = vector(&[("a", 5, 5), ("b", 9, 9)]);
        let current = vector(&[("a", 5, 5), ("b", 7, 7)]);

        assert_eq!(planner.compute_safe_threshold(&current, &baseline), None);
        assert_eq!(
            planner.compute_safe_threshold(&RevisionVector::new(), &baseline),
            None
        );
    }

    #[test]
    fn ratio_zero_without_pending_changes() {
        let planner = CompactionPlanner::default();
        assert!(planner.estimate_compaction_ratio(ChangeCounts::default()).abs() < f64::EPSILON);
        assert!(
            planner
                .estimate_compaction_ratio(ChangeCounts {
                    baseline: 40,
                    ..ChangeCounts::default()
                })
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn ratio_examples() {
        let planner = CompactionPlanner::default();

        // 10 baseline + 10 inserts: projected 20 of 20, nothing gained
        let inserts_only = planner.estimate_compaction_ratio(ChangeCounts {
            baseline: 10,
            inserts: 10,
            ..ChangeCounts::default()
        });
        assert!(inserts_only.abs() < f64::EPSILON);

        // 10 baseline + 5 deletes: projected 0 of 15
        let deletes = planner.estimate_compaction_ratio(ChangeCounts {
            baseline: 10,
            deletes: 5,
            ..ChangeCounts::default()
        });
        assert!((deletes - 1.0).abs() < f64::EPSILON);

        // 10 baseline + 5 updates: projected 5 of 15
        let updates = planner.estimate_compaction_ratio(ChangeCounts {
            baseline: 10,
            updates: 5,
            ..ChangeCounts::default()
        });
        assert!((updates - (1.0 - 5.0 / 15.0)).abs() < 1e-9);
    }

    #[test]
    fn should_rebase_without_baseline() {
        let planner = CompactionPlanner::default();
        assert!(planner.should_rebase(false, 0.0));
        assert!(!planner.should_rebase(true, 0.5));
        assert!(planner.should_rebase(true, 0.51));
    }

    #[test]
    fn min_ratio_is_clamped() {
        assert!((CompactionPlanner::new(3.0).min_ratio() - 1.0).abs() < f64::EPSILON);
        assert!(CompactionPlanner::new(-1.0).min_ratio().abs() < f64::EPSILON);
        let nan = CompactionPlanner::new(f64::NAN);
        assert!((nan.min_ratio() - DEFAULT_MIN_RATIO).abs() < f64::EPSILON);
    }
}
