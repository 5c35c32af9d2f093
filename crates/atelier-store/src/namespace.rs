//! Namespace resolution
//!
//! Maps (entity kind, user, optional year) to the concrete database
//! name the storage engine sees. Pure functions: no I/O, never fail,
//! deterministic. User identifiers are embedded verbatim, so names are
//! collision-free across users.

use atelier_model::EntityKind;
use atelier_util::{year_of_date, UserId};

/// The shared global user database. Not per-user: registration has to
/// work before an identity exists.
pub const GLOBAL_USER_DB: &str = "users";

/// Sentinel user token when no identity is signed in.
pub const ANONYMOUS_USER: &str = "anonymous";

fn user_token(user: Option<&UserId>) -> &str {
    user.map(UserId::as_str).unwrap_or(ANONYMOUS_USER)
}

/// Concrete database name for an unsharded kind.
///
/// Sharded kinds resolve through [`shard_name`]; this function rejects
/// them in debug builds, since their unsharded form names a database
/// the registry never opens.
pub fn resolve_name(kind: EntityKind, user: Option<&UserId>) -> String {
    debug_assert!(
        !kind.is_sharded(),
        "sharded kinds resolve through shard_name"
    );
    match kind {
        EntityKind::User => GLOBAL_USER_DB.to_string(),
        _ => format!("{}_{}", user_token(user), kind.as_str()),
    }
}

/// Concrete database name for one year shard of a sharded kind.
pub fn shard_name(kind: EntityKind, user: Option<&UserId>, year: i32) -> String {
    format!("{}_{}_{}", user_token(user), kind.as_str(), year)
}

/// Shard name derived from a document's date field. Unparsable dates
/// route to the current year's shard.
pub fn name_for_date(kind: EntityKind, user: Option<&UserId>, date: &str) -> String {
    shard_name(kind, user, year_of_date(date))
}

/// The `{user}_{kind}_` prefix shared by every shard of one kind, used
/// by shard discovery.
pub fn shard_prefix(kind: EntityKind, user: Option<&UserId>) -> String {
    format!("{}_{}_", user_token(user), kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_util::current_year;

    #[test]
    fn user_kind_resolves_to_global_name() {
        let u1 = UserId::new("u1");
        assert_eq!(resolve_name(EntityKind::User, Some(&u1)), "users");
        assert_eq!(resolve_name(EntityKind::User, None), "users");
    }

    #[test]
    fn unsharded_names_embed_the_user() {
        let u1 = UserId::new("u1");
        assert_eq!(resolve_name(EntityKind::Student, Some(&u1)), "u1_student");
        assert_eq!(
            resolve_name(EntityKind::StudentPackage, Some(&u1)),
            "u1_student_package"
        );
    }

    #[test]
    fn resolution_is_deterministic_and_user_disjoint() {
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        for kind in EntityKind::unsharded() {
            assert_eq!(
                resolve_name(kind, Some(&u1)),
                resolve_name(kind, Some(&u1))
            );
            if kind != EntityKind::User {
                assert_ne!(resolve_name(kind, Some(&u1)), resolve_name(kind, Some(&u2)));
            }
        }
        for kind in EntityKind::sharded() {
            assert_ne!(
                shard_name(kind, Some(&u1), 2024),
                shard_name(kind, Some(&u2), 2024)
            );
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "resolve through shard_name")]
    fn sharded_kind_cannot_resolve_unsharded() {
        let u1 = UserId::new("u1");
        resolve_name(EntityKind::Booking, Some(&u1));
    }

    #[test]
    fn missing_identity_uses_anonymous_sentinel() {
        assert_eq!(resolve_name(EntityKind::Student, None), "anonymous_student");
    }

    #[test]
    fn shard_names_carry_the_year() {
        let u1 = UserId::new("u1");
        assert_eq!(
            shard_name(EntityKind::Booking, Some(&u1), 2024),
            "u1_booking_2024"
        );
        assert_eq!(
            shard_name(EntityKind::Transaction, Some(&u1), 2023),
            "u1_transaction_2023"
        );
    }

    #[test]
    fn name_for_date_extracts_the_year() {
        let u1 = UserId::new("u1");
        assert_eq!(
            name_for_date(EntityKind::Booking, Some(&u1), "2023-08-14"),
            "u1_booking_2023"
        );
    }

    #[test]
    fn name_for_unparsable_date_matches_current_year() {
        let u1 = UserId::new("u1");
        assert_eq!(
            name_for_date(EntityKind::Booking, Some(&u1), "garbage"),
            shard_name(EntityKind::Booking, Some(&u1), current_year())
        );
    }

    #[test]
    fn shard_prefix_matches_shard_names() {
        let u1 = UserId::new("u1");
        let prefix = shard_prefix(EntityKind::Booking, Some(&u1));
        assert!(shard_name(EntityKind::Booking, Some(&u1), 2024).starts_with(&prefix));
    }
}
