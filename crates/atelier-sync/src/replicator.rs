//! One replication stream
//!
//! A stream pairs one local database with its remote counterpart and
//! loops: pull remote changes and apply them, push local changes the
//! remote has not seen, then wait for new activity on either side.
//! Failures emit an event and back off; the loop only exits on
//! cancellation.

use atelier_store::{Change, LocalDatabase};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::{ChangeRow, ChangesResponse, RemoteDatabase};
use crate::{SyncEvent, SyncResult};

const BATCH_LIMIT: usize = 100;
const IDLE_INTERVAL: Duration = Duration::from_secs(5);
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// A running stream, owned by the manager.
pub struct ReplicationHandle {
    name: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReplicationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the stream. Idempotent from the manager's point of view:
    /// the handle is consumed.
    pub fn cancel(self) {
        let _ = self.cancel.send(true);
        self.task.abort();
        info!(db = self.name.as_str(), "Replication stream cancelled");
    }
}

/// Spawn the stream for one local/remote pair.
pub fn spawn_stream(
    local: Arc<LocalDatabase>,
    remote: RemoteDatabase,
    events: mpsc::Sender<SyncEvent>,
) -> ReplicationHandle {
    let name = local.name().to_string();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let task = tokio::spawn(run_stream(local, remote, events, cancel_rx));

    ReplicationHandle {
        name,
        cancel: cancel_tx,
        task,
    }
}

async fn run_stream(
    local: Arc<LocalDatabase>,
    remote: RemoteDatabase,
    events: mpsc::Sender<SyncEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    let db = local.name().to_string();
    let _ = events.send(SyncEvent::StreamStarted { db: db.clone() }).await;
    info!(db = db.as_str(), peer = remote.peer_id().as_str(), "Replication stream started");

    let mut backoff = BACKOFF_INITIAL;

    loop {
        if *cancel.borrow() {
            break;
        }

        match replicate_once(&local, &remote, &events).await {
            Ok(remote_seq) => {
                backoff = BACKOFF_INITIAL;

                // Idle until the remote longpoll fires, a local-write
                // poll interval elapses, or we are cancelled. A page the
                // longpoll delivers is applied right here, so the next
                // pass does not fetch the same documents again.
                tokio::select! {
                    page = remote.changes(&remote_seq, BATCH_LIMIT, true) => {
                        if let Ok(page) = page {
                            if let Err(e) =
                                apply_pulled_page(&local, &remote.peer_id(), &page, &events).await
                            {
                                warn!(db = db.as_str(), error = %e, "Longpoll page apply failed");
                            }
                        }
                    }
                    _ = tokio::time::sleep(IDLE_INTERVAL) => {}
                    _ = cancel.changed() => {}
                }
            }
            Err(e) => {
                warn!(db = db.as_str(), error = %e, "Replication iteration failed");
                let _ = events
                    .send(SyncEvent::StreamError {
                        db: db.clone(),
                        message: e.to_string(),
                    })
                    .await;

                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.changed() => {}
                }
                backoff = (backoff * 2).min(BACKOFF_MAX);
            }
        }
    }

    let _ = events.send(SyncEvent::StreamStopped { db: db.clone() }).await;
    info!(db = db.as_str(), "Replication stream stopped");
}

/// One full pull-then-push pass. Returns the remote sequence reached,
/// for the idle longpoll.
async fn replicate_once(
    local: &LocalDatabase,
    remote: &RemoteDatabase,
    events: &mpsc::Sender<SyncEvent>,
) -> SyncResult<String> {
    let peer = remote.peer_id();
    let db = local.name().to_string();
    let (mut pull_seq, mut push_seq) = local.checkpoint(&peer)?;

    // Pull
    loop {
        let page = remote.changes(&pull_seq, BATCH_LIMIT, false).await?;
        let count = page.results.len();

        let mut applied = 0;
        for row in &page.results {
            if apply_remote_change(local, row)? {
                applied += 1;
            }
        }

        pull_seq = page.last_seq_string();
        local.save_checkpoint(&peer, &pull_seq, push_seq)?;

        if applied > 0 {
            debug!(db = db.as_str(), applied, "Pulled remote changes");
            let _ = events
                .send(SyncEvent::ChangesPulled {
                    db: db.clone(),
                    count: applied,
                })
                .await;
        }

        if count < BATCH_LIMIT {
            break;
        }
    }

    // Push
    loop {
        let changes = local.changes_since(push_seq, BATCH_LIMIT)?;
        if changes.is_empty() {
            break;
        }

        let docs: Vec<Value> = changes.iter().map(to_wire_doc).collect();
        remote.bulk_docs(&docs).await?;

        push_seq = changes.last().map(|c| c.seq).unwrap_or(push_seq);
        local.save_checkpoint(&peer, &pull_seq, push_seq)?;

        debug!(db = db.as_str(), count = changes.len(), "Pushed local changes");
        let _ = events
            .send(SyncEvent::ChangesPushed {
                db: db.clone(),
                count: changes.len(),
            })
            .await;

        if changes.len() < BATCH_LIMIT {
            break;
        }
    }

    Ok(pull_seq)
}

/// Apply one pulled page and advance the pull checkpoint; the push
/// checkpoint is left where it was.
async fn apply_pulled_page(
    local: &LocalDatabase,
    peer: &str,
    page: &ChangesResponse,
    events: &mpsc::Sender<SyncEvent>,
) -> SyncResult<()> {
    let (_, push_seq) = local.checkpoint(peer)?;

    let mut applied = 0;
    for row in &page.results {
        if apply_remote_change(local, row)? {
            applied += 1;
        }
    }

    local.save_checkpoint(peer, &page.last_seq_string(), push_seq)?;

    if applied > 0 {
        debug!(db = local.name(), applied, "Applied longpoll page");
        let _ = events
            .send(SyncEvent::ChangesPulled {
                db: local.name().to_string(),
                count: applied,
            })
            .await;
    }
    Ok(())
}

/// Apply one pulled change row. Returns whether the local database
/// accepted it (it loses to a newer local revision).
fn apply_remote_change(local: &LocalDatabase, row: &ChangeRow) -> SyncResult<bool> {
    let Some(rev) = row.changes.first().map(|r| r.rev.as_str()) else {
        return Ok(false);
    };

    let body = row.doc.clone().unwrap_or(Value::Null);
    Ok(local.apply_replicated(&row.id, rev, row.deleted, &body)?)
}

/// Shape one local change for `_bulk_docs`.
fn to_wire_doc(change: &Change) -> Value {
    match &change.body {
        Some(body) if !change.deleted => body.clone(),
        _ => json!({
            "_id": change.id,
            "_rev": change.rev,
            "_deleted": true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_doc_for_a_live_change_is_its_body() {
        let change = Change {
            seq: 3,
            id: "student_1_a".to_string(),
            rev: "2-abc".to_string(),
            deleted: false,
            body: Some(json!({"_id": "student_1_a", "_rev": "2-abc", "name": "Ada"})),
        };

        let doc = to_wire_doc(&change);
        assert_eq!(doc["name"], "Ada");
        assert_eq!(doc["_rev"], "2-abc");
        assert!(doc.get("_deleted").is_none());
    }

    #[test]
    fn wire_doc_for_a_tombstone_carries_deleted() {
        let change = Change {
            seq: 4,
            id: "student_1_a".to_string(),
            rev: "3-def".to_string(),
            deleted: true,
            body: None,
        };

        let doc = to_wire_doc(&change);
        assert_eq!(doc["_deleted"], true);
        assert_eq!(doc["_id"], "student_1_a");
        assert_eq!(doc["_rev"], "3-def");
    }

    #[test]
    fn pulled_change_applies_to_the_local_database() {
        let local = LocalDatabase::in_memory("u1_student").unwrap();
        let row: ChangeRow = serde_json::from_value(json!({
            "id": "student_1_a",
            "changes": [{"rev": "1-abc"}],
            "doc": {"_id": "student_1_a", "_rev": "1-abc", "type": "student", "name": "Ada"}
        }))
        .unwrap();

        assert!(apply_remote_change(&local, &row).unwrap());
        let stored = local.get("student_1_a").unwrap().unwrap();
        assert_eq!(stored.rev, "1-abc");
        assert_eq!(stored.body["name"], "Ada");

        // Replaying the same row is a no-op.
        assert!(!apply_remote_change(&local, &row).unwrap());
    }

    #[tokio::test]
    async fn longpoll_page_applies_and_advances_the_pull_checkpoint() {
        let local = LocalDatabase::in_memory("u1_student").unwrap();
        let peer = "https://couch.example.com/u1_student";
        local.save_checkpoint(peer, "7-before", 3).unwrap();

        let page: ChangesResponse = serde_json::from_value(json!({
            "results": [{
                "id": "student_1_a",
                "changes": [{"rev": "1-abc"}],
                "doc": {"_id": "student_1_a", "_rev": "1-abc", "type": "student", "name": "Ada"}
            }],
            "last_seq": "8-after"
        }))
        .unwrap();

        let (events_tx, mut events_rx) = mpsc::channel(8);
        apply_pulled_page(&local, peer, &page, &events_tx)
            .await
            .unwrap();

        // The document landed, so the same page is never fetched again.
        assert!(local.get("student_1_a").unwrap().is_some());
        assert_eq!(
            local.checkpoint(peer).unwrap(),
            ("8-after".to_string(), 3)
        );
        assert_eq!(
            events_rx.try_recv().unwrap(),
            SyncEvent::ChangesPulled {
                db: "u1_student".to_string(),
                count: 1,
            }
        );
    }

    #[test]
    fn pulled_delete_tombstones_locally() {
        let local = LocalDatabase::in_memory("u1_student").unwrap();
        local
            .apply_replicated("student_1_a", "1-abc", false, &json!({"name": "Ada"}))
            .unwrap();

        let row: ChangeRow = serde_json::from_value(json!({
            "id": "student_1_a",
            "deleted": true,
            "changes": [{"rev": "2-def"}]
        }))
        .unwrap();

        assert!(apply_remote_change(&local, &row).unwrap());
        assert!(local.get("student_1_a").unwrap().is_none());
    }
}
