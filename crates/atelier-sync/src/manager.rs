//! The sync manager
//!
//! Owns the set of running replication streams. Starting sync enrolls
//! every database the signed-in user owns; a shard that fails to
//! enroll is logged and skipped while the rest proceed. Stopping
//! cancels everything and is safe to call at any time.

use atelier_config::CoreConfig;
use atelier_model::EntityKind;
use atelier_store::RuntimeContext;
use atelier_util::current_year;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::remote::RemoteDatabase;
use crate::replicator::{spawn_stream, ReplicationHandle};
use crate::{SyncCredentials, SyncError, SyncEvent, SyncResult};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Starts, tracks, and stops the per-database replication streams.
pub struct SyncManager {
    ctx: Arc<RuntimeContext>,
    streams: Mutex<HashMap<String, ReplicationHandle>>,
    request_timeout: Duration,
}

impl SyncManager {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        Self::with_timeout(ctx, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(ctx: Arc<RuntimeContext>, request_timeout: Duration) -> Self {
        Self {
            ctx,
            streams: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    pub fn from_config(ctx: Arc<RuntimeContext>, config: &CoreConfig) -> Self {
        let timeout = config
            .remote
            .as_ref()
            .map(|r| r.request_timeout)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Self::with_timeout(ctx, timeout)
    }

    /// Start replication for every database the signed-in user owns:
    /// the global user database, each unsharded kind, and each
    /// discovered year shard of the sharded kinds. Returns the event
    /// channel for the started streams.
    ///
    /// Starting again replaces streams for the same names, so credential
    /// rotation is start-over-start.
    pub async fn start_sync(
        &self,
        credentials: &SyncCredentials,
    ) -> SyncResult<mpsc::Receiver<SyncEvent>> {
        if self.ctx.current_user().is_none() {
            return Err(SyncError::AuthenticationRequired);
        }

        let client = credentials.client(self.request_timeout)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        for kind in EntityKind::unsharded() {
            if let Err(e) = self
                .enroll(kind, None, credentials, &client, &events_tx)
                .await
            {
                warn!(kind = kind.as_str(), error = %e, "Skipping database enrollment");
            }
        }

        // Union of discovered years across the sharded kinds, plus the
        // current year (where new writes land), so both kinds get a
        // stream for every year either has data in.
        let mut years: Vec<i32> = EntityKind::sharded()
            .flat_map(|kind| self.ctx.list_shard_years(kind))
            .collect();
        years.push(current_year());
        years.sort_unstable();
        years.dedup();

        for kind in EntityKind::sharded() {
            for &year in &years {
                if let Err(e) = self
                    .enroll(kind, Some(year), credentials, &client, &events_tx)
                    .await
                {
                    warn!(kind = kind.as_str(), year, error = %e, "Skipping shard enrollment");
                }
            }
        }

        info!(
            streams = self.active_streams().len(),
            "Replication started"
        );
        Ok(events_rx)
    }

    async fn enroll(
        &self,
        kind: EntityKind,
        year: Option<i32>,
        credentials: &SyncCredentials,
        client: &reqwest::Client,
        events: &mpsc::Sender<SyncEvent>,
    ) -> SyncResult<()> {
        let local = match year {
            Some(year) => self.ctx.shard_handle(kind, year)?,
            None => self.ctx.handle(kind)?,
        };

        let url = credentials.remote_url(local.name())?;
        let remote = RemoteDatabase::new(client.clone(), url);

        // Best effort; a missing database also surfaces as stream
        // errors, which keep the stream retrying.
        if let Err(e) = remote.ensure_exists().await {
            warn!(db = local.name(), error = %e, "Remote database creation failed");
        }

        let name = local.name().to_string();
        let handle = spawn_stream(local, remote, events.clone());

        let mut streams = self.streams.lock().unwrap();
        if let Some(previous) = streams.remove(&name) {
            previous.cancel();
        }
        info!(db = name.as_str(), "Database enrolled for replication");
        streams.insert(name, handle);
        Ok(())
    }

    /// Cancel every running stream. A no-op when nothing runs.
    pub fn stop_sync(&self) {
        let drained: Vec<ReplicationHandle> = {
            let mut streams = self.streams.lock().unwrap();
            streams.drain().map(|(_, handle)| handle).collect()
        };

        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        for handle in drained {
            handle.cancel();
        }
        info!(streams = count, "Replication stopped");
    }

    /// Names of the currently enrolled databases, sorted.
    pub fn active_streams(&self) -> Vec<String> {
        let streams = self.streams.lock().unwrap();
        let mut names: Vec<String> = streams.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_syncing(&self) -> bool {
        !self.streams.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_store::UserIdentity;
    use atelier_util::current_year;

    // A port nothing listens on; enrollment succeeds (streams are
    // spawned) and the network failures surface as stream events.
    fn unreachable_credentials() -> SyncCredentials {
        SyncCredentials::Basic {
            base_url: "http://127.0.0.1:9".to_string(),
            username: "alice".to_string(),
            password: "pw".to_string(),
        }
    }

    fn signed_in_ctx() -> (tempfile::TempDir, Arc<RuntimeContext>) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(RuntimeContext::new(dir.path()).unwrap());
        ctx.sign_in(UserIdentity::new("u1", "Alice"));
        (dir, ctx)
    }

    #[tokio::test]
    async fn start_without_identity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(RuntimeContext::new(dir.path()).unwrap());
        let manager = SyncManager::with_timeout(ctx, Duration::from_millis(200));

        let result = manager.start_sync(&unreachable_credentials()).await;
        assert!(matches!(result, Err(SyncError::AuthenticationRequired)));
        assert!(!manager.is_syncing());
    }

    #[tokio::test]
    async fn start_enrolls_every_owned_database() {
        let (_dir, ctx) = signed_in_ctx();
        // Pre-existing shards from earlier years.
        ctx.shard_handle(EntityKind::Booking, 2023).unwrap();
        ctx.shard_handle(EntityKind::Transaction, 2024).unwrap();

        let manager = SyncManager::with_timeout(Arc::clone(&ctx), Duration::from_millis(200));
        let _events = manager.start_sync(&unreachable_credentials()).await.unwrap();

        let streams = manager.active_streams();
        let year = current_year();

        // 7 unsharded + 2 sharded kinds × 3 years (2023, 2024, current).
        assert!(streams.contains(&"users".to_string()));
        assert!(streams.contains(&"u1_student".to_string()));
        assert!(streams.contains(&"u1_student_package".to_string()));
        assert!(streams.contains(&"u1_booking_2023".to_string()));
        assert!(streams.contains(&"u1_booking_2024".to_string()));
        assert!(streams.contains(&format!("u1_booking_{}", year)));
        assert!(streams.contains(&"u1_transaction_2023".to_string()));
        assert!(streams.contains(&"u1_transaction_2024".to_string()));
        assert!(streams.contains(&format!("u1_transaction_{}", year)));
        assert_eq!(streams.len(), 13);

        manager.stop_sync();
    }

    #[tokio::test]
    async fn streams_report_errors_but_stay_enrolled() {
        let (_dir, ctx) = signed_in_ctx();
        let manager = SyncManager::with_timeout(ctx, Duration::from_millis(200));

        let mut events = manager.start_sync(&unreachable_credentials()).await.unwrap();

        // The unreachable remote turns into stream errors, not an
        // enrollment failure.
        let mut saw_error = false;
        for _ in 0..50 {
            match events.recv().await {
                Some(SyncEvent::StreamError { .. }) => {
                    saw_error = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(saw_error);
        assert!(manager.is_syncing());

        manager.stop_sync();
    }

    #[tokio::test]
    async fn stop_cancels_everything_and_is_idempotent() {
        let (_dir, ctx) = signed_in_ctx();
        let manager = SyncManager::with_timeout(ctx, Duration::from_millis(200));

        let _events = manager.start_sync(&unreachable_credentials()).await.unwrap();
        assert!(manager.is_syncing());

        manager.stop_sync();
        assert!(!manager.is_syncing());
        assert!(manager.active_streams().is_empty());

        // Stopping with nothing running is a no-op.
        manager.stop_sync();
    }

    #[tokio::test]
    async fn restart_replaces_streams_for_rotated_credentials() {
        let (_dir, ctx) = signed_in_ctx();
        let manager = SyncManager::with_timeout(ctx, Duration::from_millis(200));

        let _events = manager.start_sync(&unreachable_credentials()).await.unwrap();
        let before = manager.active_streams();

        manager.stop_sync();

        let rotated = SyncCredentials::Bearer {
            base_url: "http://127.0.0.1:9".to_string(),
            token: "new-token".to_string(),
        };
        let _events = manager.start_sync(&rotated).await.unwrap();
        assert_eq!(manager.active_streams(), before);

        manager.stop_sync();
    }
}
