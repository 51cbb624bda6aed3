//! Rebase errors.

use synclog_store::StoreError;

/// Errors surfaced by the rebaser and the log worker.
///
/// A failed rebase never leaves partial state behind; retrying recomputes
/// from the same durable log.
#[derive(Debug, thiserror::Error)]
pub enum RebaseError {
    /// Fetching or counting against the store failed; the log is unchanged
    #[error("store read failed: {0}")]
    StoreRead(#[source] StoreError),
    /// The transaction failed to persist; nothing was written
    #[error("store commit failed: {0}")]
    StoreCommit(#[source] StoreError),
    /// The log worker has stopped
    #[error("log worker closed")]
    WorkerClosed,
}
