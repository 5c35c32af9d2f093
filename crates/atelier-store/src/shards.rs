//! Shard discovery
//!
//! Enumerates the year shards that exist on disk for a sharded kind
//! under the current identity, by scanning the data directory for
//! files matching the kind's shard prefix.

use atelier_model::EntityKind;
use atelier_util::current_year;
use tracing::warn;

use crate::namespace::shard_prefix;
use crate::RuntimeContext;

impl RuntimeContext {
    /// Years for which a shard of `kind` exists on disk, newest first.
    ///
    /// Never fails: with no identity, no shards, or an unreadable data
    /// directory the result is `[current_year]`, so callers always have
    /// at least the shard new writes would land in.
    pub fn list_shard_years(&self, kind: EntityKind) -> Vec<i32> {
        let user = self.current_user().map(|identity| identity.id);
        let prefix = shard_prefix(kind, user.as_ref());

        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(data_dir = %self.data_dir.display(), error = %e, "Shard scan failed");
                return vec![current_year()];
            }
        };

        let mut years: Vec<i32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(".db").map(str::to_string))
            .filter_map(|name| name.strip_prefix(&prefix).and_then(|y| y.parse().ok()))
            .collect();

        years.sort_unstable();
        years.dedup();
        years.reverse();

        if years.is_empty() {
            years.push(current_year());
        }
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserIdentity;

    fn signed_in_ctx() -> (tempfile::TempDir, RuntimeContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(dir.path()).unwrap();
        ctx.sign_in(UserIdentity::new("u1", "Alice"));
        (dir, ctx)
    }

    #[test]
    fn fresh_user_sees_the_current_year() {
        let (_dir, ctx) = signed_in_ctx();
        assert_eq!(
            ctx.list_shard_years(EntityKind::Booking),
            vec![current_year()]
        );
    }

    #[test]
    fn existing_shards_are_listed_newest_first() {
        let (_dir, ctx) = signed_in_ctx();
        ctx.shard_handle(EntityKind::Booking, 2022).unwrap();
        ctx.shard_handle(EntityKind::Booking, 2024).unwrap();
        ctx.shard_handle(EntityKind::Booking, 2023).unwrap();

        assert_eq!(
            ctx.list_shard_years(EntityKind::Booking),
            vec![2024, 2023, 2022]
        );
    }

    #[test]
    fn discovery_is_scoped_to_kind_and_user() {
        let (_dir, ctx) = signed_in_ctx();
        ctx.shard_handle(EntityKind::Booking, 2023).unwrap();
        ctx.shard_handle(EntityKind::Transaction, 2021).unwrap();

        assert_eq!(ctx.list_shard_years(EntityKind::Booking), vec![2023]);
        assert_eq!(ctx.list_shard_years(EntityKind::Transaction), vec![2021]);

        ctx.sign_in(UserIdentity::new("u2", "Bob"));
        assert_eq!(
            ctx.list_shard_years(EntityKind::Booking),
            vec![current_year()]
        );
    }

    #[test]
    fn unsharded_files_do_not_pollute_discovery() {
        let (_dir, ctx) = signed_in_ctx();
        ctx.handle(EntityKind::Student).unwrap();
        ctx.shard_handle(EntityKind::Booking, 2024).unwrap();

        assert_eq!(ctx.list_shard_years(EntityKind::Booking), vec![2024]);
    }
}
