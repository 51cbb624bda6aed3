//! Serialized log worker.
//!
//! One blocking worker owns the store and drains a command queue, so appends,
//! counts and rebases against a log never overlap. `LogHandle` is the
//! cloneable front end; every request completes exactly once, after the
//! worker has committed or rolled back.

use crate::error::RebaseError;
use crate::rebaser::{RebaseOutcome, Rebaser};
use synclog_core::{ChangeCounts, EventDraft, EventId, LamportClock, ObjectChange};
use synclog_store::ChangeLogStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Completion callback for a rebase request.
pub type RebaseCallback = Box<dyn FnOnce(Result<RebaseOutcome, RebaseError>) + Send + 'static>;

type Reply<T> = oneshot::Sender<Result<T, RebaseError>>;

enum Command {
    Append {
        draft: EventDraft,
        reply: Reply<EventId>,
    },
    Record {
        replica_id: String,
        model_version: String,
        changes: Vec<ObjectChange>,
        reply: Reply<EventId>,
    },
    Counts {
        reply: Reply<ChangeCounts>,
    },
    EstimatedRatio {
        reply: Reply<f64>,
    },
    ShouldRebase {
        reply: Reply<bool>,
    },
    Rebase {
        on_complete: RebaseCallback,
    },
}

/// Spawns the worker that owns a change log.
pub struct LogWorker;

impl LogWorker {
    /// Move `store` onto a dedicated blocking worker.
    ///
    /// The worker stops once every `LogHandle` is dropped; the join handle
    /// then yields the store back.
    #[must_use]
    pub fn spawn<S>(store: S, rebaser: Rebaser) -> (LogHandle, JoinHandle<S>)
    where
        S: ChangeLogStore + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::task::spawn_blocking(move || run(store, &rebaser, rx));
        (LogHandle { tx }, join)
    }
}

fn run<S: ChangeLogStore>(
    mut store: S,
    rebaser: &Rebaser,
    mut rx: mpsc::UnboundedReceiver<Command>,
) -> S {
    tracing::debug!("Log worker started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Append { draft, reply } => {
                let _ = reply.send(store.append(draft).map_err(RebaseError::StoreCommit));
            }
            Command::Record {
                replica_id,
                model_version,
                changes,
                reply,
            } => {
                let _ = reply.send(record(&mut store, &replica_id, &model_version, changes));
            }
            Command::Counts { reply } => {
                let _ = reply.send(store.change_counts().map_err(RebaseError::StoreRead));
            }
            Command::EstimatedRatio { reply } => {
                let _ = reply.send(rebaser.estimated_compaction_ratio(&store));
            }
            Command::ShouldRebase { reply } => {
                let _ = reply.send(rebaser.should_rebase(&store));
            }
            Command::Rebase { on_complete } => {
                on_complete(rebaser.rebase(&mut store));
            }
        }
    }

    tracing::debug!("Log worker stopped");
    store
}

/// Append the next local event of a replica that has integrated the log.
fn record<S: ChangeLogStore>(
    store: &mut S,
    replica_id: &str,
    model_version: &str,
    changes: Vec<ObjectChange>,
) -> Result<EventId, RebaseError> {
    let observed = store.latest_revisions().map_err(RebaseError::StoreRead)?;
    let mut clock = LamportClock::from_vector(replica_id, &observed);
    let draft = EventDraft::new(clock.tick(), model_version, changes).with_observed(&observed);
    store.append(draft).map_err(RebaseError::StoreCommit)
}

/// Cloneable handle submitting work to a `LogWorker`.
#[derive(Clone)]
pub struct LogHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl LogHandle {
    /// Append a prepared event.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreCommit` if the event cannot be persisted.
    pub async fn append(&self, draft: EventDraft) -> Result<EventId, RebaseError> {
        self.request(|reply| Command::Append { draft, reply }).await
    }

    /// Append the next event of `replica_id`, observing everything in the log.
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read or the event persisted.
    pub async fn record(
        &self,
        replica_id: impl Into<String>,
        model_version: impl Into<String>,
        changes: Vec<ObjectChange>,
    ) -> Result<EventId, RebaseError> {
        let replica_id = replica_id.into();
        let model_version = model_version.into();
        self.request(|reply| Command::Record {
            replica_id,
            model_version,
            changes,
            reply,
        })
        .await
    }

    /// Current change counts.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if counting fails.
    pub async fn counts(&self) -> Result<ChangeCounts, RebaseError> {
        self.request(|reply| Command::Counts { reply }).await
    }

    /// Estimated fraction of stored changes a rebase would remove.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if counting fails.
    pub async fn estimated_compaction_ratio(&self) -> Result<f64, RebaseError> {
        self.request(|reply| Command::EstimatedRatio { reply }).await
    }

    /// Whether a rebase is worthwhile right now.
    ///
    /// # Errors
    ///
    /// Returns `RebaseError::StoreRead` if the store cannot be queried.
    pub async fn should_rebase(&self) -> Result<bool, RebaseError> {
        self.request(|reply| Command::ShouldRebase { reply }).await
    }

    /// Queue a rebase; `on_complete` runs exactly once with its result.
    ///
    /// If the worker has stopped, `on_complete` runs immediately with
    /// `RebaseError::WorkerClosed`.
    pub fn rebase_with<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<RebaseOutcome, RebaseError>) + Send + 'static,
    {
        let command = Command::Rebase {
            on_complete: Box::new(on_complete),
        };
        if let Err(mpsc::error::SendError(Command::Rebase { on_complete })) = self.tx.send(command)
        {
            on_complete(Err(RebaseError::WorkerClosed));
        }
    }

    /// Rebase and wait for the result.
    ///
    /// # Errors
    ///
    /// Returns the rebase error, or `RebaseError::WorkerClosed`.
    pub async fn rebase(&self) -> Result<RebaseOutcome, RebaseError> {
        let (reply, rx) = oneshot::channel();
        self.rebase_with(move |result| {
            let _ = reply.send(result);
        });
        rx.await.map_err(|_| RebaseError::WorkerClosed)?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RebaseError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| RebaseError::WorkerClosed)?;
        rx.await.map_err(|_| RebaseError::WorkerClosed)?
    }
}
