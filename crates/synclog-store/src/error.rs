//! Store errors.

use synclog_core::EventId;

/// Errors raised by change-log stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The `SQLite` backend failed
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A persisted value could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),
    /// A persisted row holds a value outside its domain
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// An event expected to exist is missing
    #[error("event {0} not found")]
    MissingEvent(EventId),
    /// A second baseline was about to be created
    #[error("log already has a baseline")]
    DuplicateBaseline,
    /// A failure injected by a test fault plan
    #[error("injected failure: {0}")]
    Injected(&'static str),
}
