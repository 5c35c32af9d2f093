//! Continuous bidirectional replication
//!
//! Mirrors every database the signed-in user owns against its
//! counterpart on a CouchDB-compatible remote: the shared global user
//! database, one database per unsharded kind, and one per discovered
//! year shard of the sharded kinds. Each pair gets an independent
//! stream; one failing shard never takes the rest down.
//!
//! Streams run until cancelled and report progress over an event
//! channel rather than through return values.

mod credentials;
mod manager;
mod remote;
mod replicator;

pub use credentials::SyncCredentials;
pub use manager::SyncManager;
pub use remote::RemoteDatabase;
pub use replicator::ReplicationHandle;

use atelier_store::StoreError;
use thiserror::Error;

/// Sync errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Replication was requested with no signed-in user.
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Http(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Progress and failure notifications from running streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StreamStarted { db: String },
    ChangesPulled { db: String, count: usize },
    ChangesPushed { db: String, count: usize },
    /// A stream iteration failed. The stream stays enrolled and
    /// retries with backoff.
    StreamError { db: String, message: String },
    StreamStopped { db: String },
}
