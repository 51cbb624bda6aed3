//! Agent runtime orchestration.

use crate::config::{AgentConfig, SquashPolicy, StoreType};
use crate::rebaser::{RebaseOutcome, Rebaser};
use crate::worker::{LogHandle, LogWorker};
use anyhow::{Context, Result};
use synclog_core::{CompactionPlanner, LatestPerObject};
use synclog_store::{ChangeLogStore, MemoryStore, SqliteStore};
use tracing::Instrument;

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    replica_id: String,
}

impl Agent {
    /// Create a new agent.
    #[must_use]
    pub fn new(config: AgentConfig, replica_id: impl Into<String>) -> Self {
        Self {
            config,
            replica_id: replica_id.into(),
        }
    }

    /// Build the rebaser described by the compaction configuration.
    #[must_use]
    pub fn rebaser(&self) -> Rebaser {
        let compaction = &self.config.compaction;
        let rebaser = Rebaser::new(compaction.model_version.clone())
            .with_planner(CompactionPlanner::new(compaction.min_ratio));
        match compaction.squash {
            SquashPolicy::Retain => rebaser,
            SquashPolicy::Latest => rebaser.with_squasher(LatestPerObject),
        }
    }

    /// Run the agent's main loop until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or the worker panics.
    pub async fn run(self) -> Result<()> {
        let span = tracing::info_span!("agent", replica_id = %self.replica_id);

        let store_type = self.config.persistence.store_type;
        match store_type {
            StoreType::Sqlite => {
                let store = SqliteStore::open(&self.config.persistence.db_path)
                    .context("Failed to open SQLite database")?;
                self.run_with(store).instrument(span).await
            }
            StoreType::Memory => {
                tracing::warn!("Using in-memory store, the log is lost on exit");
                self.run_with(MemoryStore::new()).instrument(span).await
            }
        }
    }

    async fn run_with<S: ChangeLogStore + 'static>(self, store: S) -> Result<()> {
        tracing::info!(
            store_type = ?self.config.persistence.store_type,
            interval_secs = self.config.compaction.interval.as_secs(),
            min_ratio = self.config.compaction.min_ratio,
            "Starting agent runtime"
        );

        let (handle, join) = LogWorker::spawn(store, self.rebaser());
        let mut ticker = tokio::time::interval(self.config.compaction.interval);

        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match run_cycle(&handle).await {
                        Ok(outcome) => {
                            tracing::info!(outcome = ?outcome, "Compaction cycle finished");
                        }
                        Err(err) => tracing::warn!(error = %err, "Compaction cycle failed"),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(handle);
        join.await.context("Log worker panicked")?;

        tracing::info!("Agent stopped");
        Ok(())
    }
}

/// Run one compaction cycle, rebasing only when the planner finds it
/// worthwhile.
///
/// Returns `None` when the rebase was skipped.
///
/// # Errors
///
/// Returns error if the store cannot be read or the rebase fails.
pub async fn run_cycle(handle: &LogHandle) -> Result<Option<RebaseOutcome>> {
    if !handle.should_rebase().await? {
        tracing::debug!("Rebase not worthwhile yet");
        return Ok(None);
    }
    Ok(Some(handle.rebase().await?))
}
