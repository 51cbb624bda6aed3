//! # synclog Agent
//!
//! Baseline rebasing and the compaction agent for a multi-writer change log.
//!
//! ## Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | `Rebaser` | Folds events below the safe threshold into the baseline in one transaction |
//! | `LogWorker` / `LogHandle` | Single blocking worker owning the store; serialized requests with completion callbacks |
//! | `Agent` | Periodic compaction cycle: rebase when the planner finds it worthwhile |
//! | `AgentConfig` | Environment configuration |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod rebaser;
pub mod runtime;
pub mod worker;

pub use config::{AgentConfig, CompactionConfig, PersistenceConfig, SquashPolicy, StoreType};
pub use error::RebaseError;
pub use rebaser::{RebaseOutcome, Rebaser};
pub use runtime::{run_cycle, Agent};
pub use worker::{LogHandle, LogWorker, RebaseCallback};
