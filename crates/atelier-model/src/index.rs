//! Index sets
//!
//! For each entity kind, the fixed list of field tuples its database
//! must carry. Provisioned once per handle by the registry; creation is
//! idempotent and best-effort.

use crate::EntityKind;

/// One index over a tuple of top-level document fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub fields: &'static [&'static str],
}

const USER_INDEXES: &[IndexSpec] = &[IndexSpec {
    fields: &["type", "username", "created_at"],
}];

const STUDENT_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        fields: &["type", "name"],
    },
    IndexSpec {
        fields: &["type", "phone"],
    },
    IndexSpec {
        fields: &["type", "created_at"],
    },
];

const PACKAGE_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        fields: &["type", "name"],
    },
    IndexSpec {
        fields: &["type", "active", "created_at"],
    },
];

const STUDENT_PACKAGE_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        fields: &["type", "student_id"],
    },
    IndexSpec {
        fields: &["type", "package_id"],
    },
    IndexSpec {
        fields: &["type", "status", "expiry_date"],
    },
];

const CLASS_TYPE_INDEXES: &[IndexSpec] = &[IndexSpec {
    fields: &["type", "name", "created_at"],
}];

const CLASS_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        fields: &["type", "location_id"],
    },
    IndexSpec {
        fields: &["type", "instructor"],
    },
    IndexSpec {
        fields: &["type", "start_date", "start_time"],
    },
    IndexSpec {
        fields: &["type", "active", "created_at"],
    },
];

const BOOKING_INDEXES: &[IndexSpec] = &[IndexSpec {
    fields: &["type", "class_id", "class_date", "class_time"],
}];

const TRANSACTION_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        fields: &["type", "student_id"],
    },
    IndexSpec {
        fields: &["type", "transaction_type"],
    },
    IndexSpec {
        fields: &["type", "created_at"],
    },
    IndexSpec {
        fields: &["type", "class_id"],
    },
    IndexSpec {
        fields: &["type", "package_id"],
    },
];

const LOCATION_INDEXES: &[IndexSpec] = &[IndexSpec {
    fields: &["type", "name", "created_at"],
}];

/// The index set for one entity kind's databases (every shard of a
/// sharded kind carries the same set).
pub fn indexes_for(kind: EntityKind) -> &'static [IndexSpec] {
    match kind {
        EntityKind::User => USER_INDEXES,
        EntityKind::Student => STUDENT_INDEXES,
        EntityKind::Package => PACKAGE_INDEXES,
        EntityKind::StudentPackage => STUDENT_PACKAGE_INDEXES,
        EntityKind::ClassType => CLASS_TYPE_INDEXES,
        EntityKind::Class => CLASS_INDEXES,
        EntityKind::Booking => BOOKING_INDEXES,
        EntityKind::Transaction => TRANSACTION_INDEXES,
        EntityKind::Location => LOCATION_INDEXES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_at_least_one_index() {
        for kind in EntityKind::ALL {
            assert!(!indexes_for(kind).is_empty(), "no indexes for {}", kind);
        }
    }

    #[test]
    fn every_index_leads_with_the_type_field() {
        for kind in EntityKind::ALL {
            for spec in indexes_for(kind) {
                assert_eq!(spec.fields.first(), Some(&"type"));
            }
        }
    }
}
