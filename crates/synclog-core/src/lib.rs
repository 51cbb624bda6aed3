//! # synclog Core
//!
//! Revision bookkeeping, data model, and compaction planning for a
//! multi-writer change log.
//!
//! This crate provides:
//! - Revisions and revision vectors tracking what each replica has observed
//! - A per-replica Lamport clock for the append path
//! - The modification event / object change data model
//! - The compaction planner deciding where and whether to rebase
//! - The change-squashing interface applied when events fold into the baseline

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod event;
pub mod planner;
pub mod revision;
pub mod squash;

pub use clock::LamportClock;
pub use event::{ChangeType, EventDraft, EventId, EventKind, ModificationEvent, ObjectChange};
pub use planner::{ChangeCounts, CompactionPlanner, DEFAULT_MIN_RATIO};
pub use revision::{Revision, RevisionVector};
pub use squash::{ChangeSquasher, LatestPerObject, RetainAll};
