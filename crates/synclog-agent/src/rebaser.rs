//! Baseline rebasing.
//!
//! Folds every event at or below the safe threshold into the baseline inside
//! one store transaction:
//! 1. Compute the threshold from the latest revisions and the baseline's
//! 2. Fetch the eligible regular events
//! 3. Load or create the baseline
//! 4. Union the baseline's changes with the folded events' changes
//! 5. Squash, advance the baseline, merge revision vectors
//! 6. Delete the folded events and commit

use crate::error::RebaseError;
use chrono::Utc;
use synclog_core::{ChangeSquasher, CompactionPlanner, EventId, RetainAll, RevisionVector};
use synclog_store::{ChangeLogStore, LogTransaction};

/// Result of a successful `Rebaser::rebase` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Every replica is stale relative to the baseline, or the log is empty
    NoSafeThreshold,
    /// No regular event lies at or below the threshold
    NothingToFold {
        /// Computed threshold
        threshold: u64,
    },
    /// Events were folded into the baseline
    Rebased {
        /// Computed threshold; the baseline's global count never drops below it
        threshold: u64,
        /// Events whose changes were merged into the baseline
        folded_events: usize,
        /// Changes held by the baseline after squashing
        baseline_changes: usize,
    },
}

impl RebaseOutcome {
    /// Check whether the log was modified.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !matches!(self, RebaseOutcome::Rebased { .. })
    }
}

/// Merges old events into the baseline.
pub struct Rebaser {
    planner: CompactionPlanner,
    squasher: Box<dyn ChangeSquasher>,
    model_version: String,
}

impl std::fmt::Debug for Rebaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rebaser")
            .field("planner", &self.planner)
            .field("model_version", &self.model_version)
            .finish_non_exhaustive()
    }
}

impl Rebaser {
    /// Create a rebaser with the default planner, keeping every change.
    #[must_use]
    pub fn new(model_version: impl Into<String>) -> Self {
        Self {
            planner: CompactionPlanner::default(),
            squasher: Box::new(RetainAll),
            model_version: model_version.into(),
        }
    }

    /// Use a custom compaction planner.
    #[must_use]
    pub fn with_planner(mut self, planner: CompactionPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Use a custom change squasher.
    #[must_use]
    pub fn with_squasher(mut self, squasher: impl ChangeSquasher + 'static) -> Self {
        self.squasher = Box::new(squasher);
        self
    }

    /// Get the compaction planner.
    #[must_use]
    pub fn planner(&self) -> &CompactionPlanner {
        &self.planner
    }

    /// Estimate the fraction of stored changes a rebase would remove.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if counting fails.
    pub fn estimated_compaction_ratio<S: ChangeLogStore>(
        &self,
        store: &S,
    ) -> Result<f64, RebaseError> {
        let counts = store.change_counts().map_err(RebaseError::StoreRead)?;
        Ok(self.planner.estimate_compaction_ratio(counts))
    }

    /// Decide whether rebasing is worthwhile right now.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if the store cannot be queried.
    pub fn should_rebase<S: ChangeLogStore>(&self, store: &S) -> Result<bool, RebaseError> {
        let has_baseline = store.has_baseline().map_err(RebaseError::StoreRead)?;
        if !has_baseline {
            return Ok(true);
        }
        let ratio = self.estimated_compaction_ratio(store)?;
        let rebase = self.planner.should_rebase(has_baseline, ratio);
        tracing::debug!(ratio, min_ratio = self.planner.min_ratio(), rebase, "Evaluated rebase");
        Ok(rebase)
    }

    /// Fold every safely foldable event into the baseline.
    ///
    /// Finding nothing to fold is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if a fetch fails and
    /// `RebaseError::StoreCommit` if the merged state cannot be persisted.
    /// The log is unchanged in both cases.
    pub fn rebase<S: ChangeLogStore>(&self, store: &mut S) -> Result<RebaseOutcome, RebaseError> {
        let mut tx = store.begin().map_err(RebaseError::StoreRead)?;

        let existing = tx.fetch_baseline().map_err(RebaseError::StoreRead)?;
        let prior_revisions = existing
            .as_ref()
            .map(|baseline| baseline.revisions.clone())
            .unwrap_or_default();
        let latest = tx.latest_revisions().map_err(RebaseError::StoreRead)?;

        let Some(threshold) = self.planner.compute_safe_threshold(&latest, &prior_revisions) else {
            tracing::debug!(replicas = latest.len(), "No safe rebase threshold");
            return Ok(RebaseOutcome::NoSafeThreshold);
        };

        let folded = tx
            .fetch_events_up_to(threshold)
            .map_err(RebaseError::StoreRead)?;
        if folded.is_empty() {
            tracing::debug!(threshold, "No events to fold");
            return Ok(RebaseOutcome::NothingToFold { threshold });
        }

        let mut baseline = match existing {
            Some(baseline) => baseline,
            None => {
                let baseline = tx
                    .create_baseline(&self.model_version)
                    .map_err(RebaseError::StoreCommit)?;
                tracing::info!(baseline_id = %baseline.id, "Created baseline");
                baseline
            }
        };

        tx.prefetch_changes(&folded).map_err(RebaseError::StoreRead)?;
        let folded_ids: Vec<EventId> = folded.iter().map(|event| event.id).collect();
        let mut changes = tx
            .fetch_changes(&[baseline.id])
            .map_err(RebaseError::StoreRead)?;
        changes.extend(tx.fetch_changes(&folded_ids).map_err(RebaseError::StoreRead)?);
        let changes = self.squasher.squash(changes);

        baseline.global_count = baseline.global_count.max(threshold);
        baseline.timestamp = Utc::now();
        baseline.model_version.clone_from(&self.model_version);
        baseline.revisions = RevisionVector::merge_max(
            std::iter::once(&prior_revisions).chain(folded.iter().map(|event| &event.revisions)),
        );

        tx.update_baseline(&baseline, &changes)
            .map_err(RebaseError::StoreCommit)?;
        for id in folded_ids {
            tx.delete_event(id).map_err(RebaseError::StoreCommit)?;
        }

        if let Err(err) = tx.commit() {
            tracing::error!(error = %err, threshold, "Rebase commit failed, rolled back");
            return Err(RebaseError::StoreCommit(err));
        }

        tracing::info!(
            threshold,
            folded_events = folded.len(),
            baseline_changes = changes.len(),
            "Rebased change log"
        );

        Ok(RebaseOutcome::Rebased {
            threshold,
            folded_events: folded.len(),
            baseline_changes: changes.len(),
        })
    }
}
