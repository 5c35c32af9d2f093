//! Local persistence core for atelier
//!
//! Provides:
//! - Namespace resolution (entity kind + user + optional year shard →
//!   concrete database name)
//! - The database registry: one lazily-opened handle per concrete name,
//!   with one-time index provisioning
//! - Generic document CRUD over any one handle
//! - Shard discovery for the year-sharded kinds
//!
//! The fixed dependency order is resolver → registry → CRUD →
//! (optional) replication; there is no shortcut path.

mod context;
mod crud;
mod database;
mod namespace;
mod registry;
mod selector;
mod shards;

pub use context::*;
pub use crud::*;
pub use database::*;
pub use namespace::*;
pub use selector::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation needing a user identity was invoked with none
    /// present. Never retried internally.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// `update` on an identifier that does not exist. Reads and deletes
    /// report absence as `None`/`false` instead.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Revision mismatch on write. Surfaced to the caller, never
    /// silently resolved; losers of a write race re-read and retry.
    #[error("Revision conflict on document: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
