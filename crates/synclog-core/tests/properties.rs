//! Property-based tests for revision merging and compaction planning.
//!
//! Revision vector merge must form a join semilattice:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a

use proptest::prelude::*;
use synclog_core::{ChangeCounts, CompactionPlanner, Revision, RevisionVector};

fn revision_strategy() -> impl Strategy<Value = Revision> {
    (
        prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")],
        1u64..50,
        1u64..200,
    )
        .prop_map(|(replica, number, global)| Revision::new(replica, number, global))
}

fn vector_strategy() -> impl Strategy<Value = RevisionVector> {
    prop::collection::vec(revision_strategy(), 0..8).prop_map(RevisionVector::from_revisions)
}

fn counts_strategy() -> impl Strategy<Value = ChangeCounts> {
    (0u64..1000, 0u64..1000, 0u64..1000, 0u64..1000).prop_map(
        |(baseline, inserts, updates, deletes)| ChangeCounts {
            baseline,
            inserts,
            updates,
            deletes,
        },
    )
}

proptest! {
    #[test]
    fn merge_max_is_commutative(a in vector_strategy(), b in vector_strategy()) {
        prop_assert_eq!(
            RevisionVector::merge_max([&a, &b]),
            RevisionVector::merge_max([&b, &a])
        );
    }

    #[test]
    fn merge_max_is_associative(
        a in vector_strategy(),
        b in vector_strategy(),
        c in vector_strategy()
    ) {
        let ab = RevisionVector::merge_max([&a, &b]);
        let bc = RevisionVector::merge_max([&b, &c]);
        prop_assert_eq!(
            RevisionVector::merge_max([&ab, &c]),
            RevisionVector::merge_max([&a, &bc])
        );
    }

    #[test]
    fn merge_max_is_idempotent(a in vector_strategy()) {
        prop_assert_eq!(RevisionVector::merge_max([&a, &a]), a);
    }

    #[test]
    fn merge_max_dominates_inputs(a in vector_strategy(), b in vector_strategy()) {
        let merged = RevisionVector::merge_max([&a, &b]);
        for revision in a.iter().chain(b.iter()) {
            prop_assert!(merged.covers(revision));
        }
    }

    #[test]
    fn threshold_ignores_exactly_stale_replicas(
        current in vector_strategy(),
        baseline in vector_strategy()
    ) {
        let expected = current
            .iter()
            .filter(|r| !baseline.covers(r))
            .map(|r| r.global_count)
            .min();
        prop_assert_eq!(
            CompactionPlanner::default().compute_safe_threshold(&current, &baseline),
            expected
        );
    }

    #[test]
    fn ratio_is_bounded(counts in counts_strategy()) {
        let ratio = CompactionPlanner::default().estimate_compaction_ratio(counts);
        prop_assert!((0.0..=1.0).contains(&ratio));
    }

    #[test]
    fn ratio_non_decreasing_in_deletes(counts in counts_strategy(), extra in 1u64..100) {
        let planner = CompactionPlanner::default();
        let more = ChangeCounts { deletes: counts.deletes + extra, ..counts };
        prop_assert!(
            planner.estimate_compaction_ratio(more) + 1e-12
                >= planner.estimate_compaction_ratio(counts)
        );
    }

    #[test]
    fn no_baseline_always_rebases(ratio in 0.0f64..=1.0, min_ratio in 0.0f64..=1.0) {
        prop_assert!(CompactionPlanner::new(min_ratio).should_rebase(false, ratio));
    }
}
