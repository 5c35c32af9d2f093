//! Data model for the atelier booking/CRM core
//!
//! Provides:
//! - The fixed enumeration of entity kinds and their sharding rules
//! - Document metadata and one typed document schema per kind
//! - The index set each kind's database must carry

mod document;
mod index;
mod kind;

pub use document::*;
pub use index::*;
pub use kind::*;
