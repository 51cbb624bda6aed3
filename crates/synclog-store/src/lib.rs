//! # synclog Store
//!
//! The transactional change-log contract consumed by the rebaser, plus two
//! backends.
//!
//! ## Backends
//!
//! - `MemoryStore`: whole-state copy-on-begin transactions, with fault
//!   injection for exercising failure paths
//! - `SqliteStore`: `rusqlite`-backed durable log with cascading change
//!   deletion and a single-baseline constraint

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use memory::{FaultPlan, MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};
pub use store::{ChangeFilter, ChangeLogStore, ChangeScope, LogTransaction};
