//! Entity kinds
//!
//! Each kind maps to exactly one logical database. Bookings and
//! transactions are high-volume and additionally sharded by the
//! calendar year of their date field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed document categories the core persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Student,
    Package,
    StudentPackage,
    ClassType,
    Class,
    Booking,
    Transaction,
    Location,
}

impl EntityKind {
    /// Every kind, in enrollment order.
    pub const ALL: [EntityKind; 9] = [
        EntityKind::User,
        EntityKind::Student,
        EntityKind::Package,
        EntityKind::StudentPackage,
        EntityKind::ClassType,
        EntityKind::Class,
        EntityKind::Booking,
        EntityKind::Transaction,
        EntityKind::Location,
    ];

    /// The snake_case name used both as the `type` discriminator and as
    /// the kind token inside concrete database names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Student => "student",
            EntityKind::Package => "package",
            EntityKind::StudentPackage => "student_package",
            EntityKind::ClassType => "class_type",
            EntityKind::Class => "class",
            EntityKind::Booking => "booking",
            EntityKind::Transaction => "transaction",
            EntityKind::Location => "location",
        }
    }

    /// Parse a kind from its snake_case name.
    pub fn from_name(name: &str) -> Option<EntityKind> {
        EntityKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Whether this kind's logical database is partitioned by calendar
    /// year.
    pub fn is_sharded(&self) -> bool {
        matches!(self, EntityKind::Booking | EntityKind::Transaction)
    }

    /// Whether database access for this kind requires a signed-in user.
    ///
    /// The user database is shared and global; registration has to work
    /// before an identity exists.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, EntityKind::User)
    }

    /// The kinds whose logical database is not year-sharded.
    pub fn unsharded() -> impl Iterator<Item = EntityKind> {
        EntityKind::ALL.into_iter().filter(|k| !k.is_sharded())
    }

    /// The year-sharded kinds.
    pub fn sharded() -> impl Iterator<Item = EntityKind> {
        EntityKind::ALL.into_iter().filter(|k| k.is_sharded())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
