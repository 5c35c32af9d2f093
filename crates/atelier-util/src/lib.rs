//! Shared utilities for the atelier data core
//!
//! This crate provides:
//! - ID types (UserId, DocumentId)
//! - Time helpers (RFC 3339 timestamps, calendar-year extraction)

mod ids;
mod time;

pub use ids::*;
pub use time::*;
