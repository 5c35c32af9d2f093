//! The embedded storage engine behind one concrete database name
//!
//! One SQLite file per concrete name. Documents are JSON bodies with a
//! store-assigned revision token `{generation}-{suffix}`; writes carry
//! the expected revision and stale writes are rejected, which is the
//! only per-document ordering guarantee the core gives. Deletes leave
//! tombstones so replication can propagate them. Every write bumps a
//! per-database change sequence consumed by the replicator.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{Condition, Selector, StoreError, StoreResult};

/// An open connection to one concrete database.
///
/// Owned by the registry; at most one handle exists per concrete name.
pub struct LocalDatabase {
    name: String,
    conn: Mutex<Connection>,
}

/// A live document as read back from the engine. The body carries
/// `_id` and `_rev` exactly as they go over the wire.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub rev: String,
    pub body: Value,
}

/// One row of the change feed.
#[derive(Debug, Clone)]
pub struct Change {
    pub seq: i64,
    pub id: String,
    pub rev: String,
    pub deleted: bool,
    /// `None` for tombstones.
    pub body: Option<Value>,
}

/// Result of provisioning one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    /// Benign: the index was provisioned by an earlier process
    /// lifetime. Distinguished from genuine failures so those are not
    /// silently hidden.
    AlreadyExists,
}

impl LocalDatabase {
    /// Open or create the database file for one concrete name.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            name: name.into(),
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(name: impl Into<String>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            name: name.into(),
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// The concrete database name this handle serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Documents, including tombstones for replicated deletes
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                rev TEXT NOT NULL,
                seq INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_seq ON documents(seq);

            -- Per-peer replication checkpoints
            CREATE TABLE IF NOT EXISTS sync_checkpoints (
                peer TEXT PRIMARY KEY,
                pull_seq TEXT NOT NULL DEFAULT '0',
                push_seq INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        debug!(db = self.name.as_str(), "Database schema initialized");
        Ok(())
    }

    /// Write a document body under a revision check.
    ///
    /// `expected_rev` is `None` for creation; a live document under the
    /// same id then rejects the write. Writing over a tombstone without
    /// a revision is allowed (id resurrection after a replicated
    /// delete). Returns the newly assigned revision.
    pub fn put(&self, id: &str, expected_rev: Option<&str>, body: &Value) -> StoreResult<String> {
        let conn = self.conn.lock().unwrap();

        let current: Option<(String, bool)> = conn
            .query_row(
                "SELECT rev, deleted FROM documents WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;

        let prev_rev = match (&current, expected_rev) {
            (None, None) => None,
            (Some((rev, true)), None) => Some(rev.as_str()),
            (Some((rev, _)), Some(expected)) if rev == expected => Some(rev.as_str()),
            _ => {
                debug!(db = self.name.as_str(), id, "Rejected write with stale revision");
                return Err(StoreError::Conflict(id.to_string()));
            }
        };

        let rev = next_rev(prev_rev);
        let stored = storable_body(id, body)?;

        conn.execute(
            r#"
            INSERT INTO documents (id, rev, seq, deleted, body)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents), 0, ?3)
            ON CONFLICT(id)
            DO UPDATE SET rev = excluded.rev, seq = excluded.seq, deleted = 0, body = excluded.body
            "#,
            params![id, rev, stored],
        )?;

        Ok(rev)
    }

    /// Read a live document. Tombstoned or absent ids read as `None`.
    pub fn get(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT rev, body FROM documents WHERE id = ? AND deleted = 0",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((rev, body)) => {
                let body = inflate_body(id, &rev, &body)?;
                Ok(Some(StoredDocument {
                    id: id.to_string(),
                    rev,
                    body,
                }))
            }
            None => Ok(None),
        }
    }

    /// Hard-delete under a revision check, leaving a tombstone for
    /// replication. Returns the tombstone's revision.
    pub fn delete(&self, id: &str, expected_rev: &str) -> StoreResult<String> {
        let conn = self.conn.lock().unwrap();

        let current: Option<String> = conn
            .query_row(
                "SELECT rev FROM documents WHERE id = ? AND deleted = 0",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match current {
            Some(rev) if rev == expected_rev => {
                let tombstone_rev = next_rev(Some(&rev));
                conn.execute(
                    r#"
                    UPDATE documents
                    SET rev = ?2,
                        seq = (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents),
                        deleted = 1,
                        body = '{}'
                    WHERE id = ?1
                    "#,
                    params![id, tombstone_rev],
                )?;
                Ok(tombstone_rev)
            }
            _ => {
                debug!(db = self.name.as_str(), id, "Rejected delete with stale revision");
                Err(StoreError::Conflict(id.to_string()))
            }
        }
    }

    /// Provision one index over top-level document fields. Safe to call
    /// again for an existing index.
    pub fn create_field_index(&self, fields: &[&str]) -> StoreResult<IndexOutcome> {
        let conn = self.conn.lock().unwrap();

        let index_name = format!("idx_{}", fields.join("_"));
        let exprs: Vec<String> = fields
            .iter()
            .map(|f| format!("json_extract(body, '$.{}')", f))
            .collect();
        let sql = format!(
            "CREATE INDEX \"{}\" ON documents ({})",
            index_name,
            exprs.join(", ")
        );

        match conn.execute(&sql, []) {
            Ok(_) => Ok(IndexOutcome::Created),
            Err(e) if e.to_string().contains("already exists") => Ok(IndexOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Live documents matching a selector.
    pub fn query(&self, selector: &Selector) -> StoreResult<Vec<Value>> {
        let conn = self.conn.lock().unwrap();

        let (where_sql, bindings) = compile_selector(selector);
        let sql = format!(
            "SELECT id, rev, body FROM documents WHERE deleted = 0{}",
            where_sql
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bindings), |row| {
            let id: String = row.get(0)?;
            let rev: String = row.get(1)?;
            let body: String = row.get(2)?;
            Ok((id, rev, body))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, rev, body) = row?;
            docs.push(inflate_body(&id, &rev, &body)?);
        }
        Ok(docs)
    }

    /// Change feed: rows with a sequence strictly greater than `since`,
    /// ascending, at most `limit`.
    pub fn changes_since(&self, since: i64, limit: usize) -> StoreResult<Vec<Change>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT seq, id, rev, deleted, body FROM documents WHERE seq > ? ORDER BY seq ASC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![since, limit as i64], |row| {
            let seq: i64 = row.get(0)?;
            let id: String = row.get(1)?;
            let rev: String = row.get(2)?;
            let deleted: bool = row.get::<_, i64>(3)? != 0;
            let body: String = row.get(4)?;
            Ok((seq, id, rev, deleted, body))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            let (seq, id, rev, deleted, body) = row?;
            let body = if deleted {
                None
            } else {
                Some(inflate_body(&id, &rev, &body)?)
            };
            changes.push(Change {
                seq,
                id,
                rev,
                deleted,
                body,
            });
        }
        Ok(changes)
    }

    /// Highest change sequence in this database.
    pub fn max_seq(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let seq: i64 =
            conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM documents", [], |row| {
                row.get(0)
            })?;
        Ok(seq)
    }

    /// Apply a replicated document as-is (`new_edits=false` semantics):
    /// the incoming revision is kept verbatim, and the higher revision
    /// generation wins, with a lexicographic tie-break. Returns whether
    /// the write was applied.
    pub fn apply_replicated(
        &self,
        id: &str,
        rev: &str,
        deleted: bool,
        body: &Value,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();

        let current: Option<String> = conn
            .query_row("SELECT rev FROM documents WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(current_rev) = &current {
            if !rev_wins(rev, current_rev) {
                return Ok(false);
            }
        }

        let stored = if deleted {
            "{}".to_string()
        } else {
            storable_body(id, body)?
        };

        conn.execute(
            r#"
            INSERT INTO documents (id, rev, seq, deleted, body)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents), ?3, ?4)
            ON CONFLICT(id)
            DO UPDATE SET rev = excluded.rev, seq = excluded.seq,
                          deleted = excluded.deleted, body = excluded.body
            "#,
            params![id, rev, deleted as i64, stored],
        )?;

        Ok(true)
    }

    /// Replication checkpoint for one peer: (pull sequence on the
    /// remote, push sequence in this database).
    pub fn checkpoint(&self, peer: &str) -> StoreResult<(String, i64)> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT pull_seq, push_seq FROM sync_checkpoints WHERE peer = ?",
                [peer],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.unwrap_or_else(|| ("0".to_string(), 0)))
    }

    pub fn save_checkpoint(&self, peer: &str, pull_seq: &str, push_seq: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO sync_checkpoints (peer, pull_seq, push_seq)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(peer)
            DO UPDATE SET pull_seq = excluded.pull_seq, push_seq = excluded.push_seq
            "#,
            params![peer, pull_seq, push_seq],
        )?;
        Ok(())
    }
}

/// Next revision token: bumped generation, fresh random suffix.
fn next_rev(prev: Option<&str>) -> String {
    let generation = prev.map(rev_generation).unwrap_or(0) + 1;
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", generation, &hex[..8])
}

fn rev_generation(rev: &str) -> u64 {
    rev.split('-')
        .next()
        .and_then(|g| g.parse().ok())
        .unwrap_or(0)
}

/// Deterministic winner between two revisions of the same document:
/// higher generation, then lexicographically greater token.
fn rev_wins(incoming: &str, current: &str) -> bool {
    let (a, b) = (rev_generation(incoming), rev_generation(current));
    if a != b {
        return a > b;
    }
    incoming > current
}

/// Body as persisted: `_id` pinned, `_rev` stripped (the rev column is
/// authoritative).
fn storable_body(id: &str, body: &Value) -> StoreResult<String> {
    let mut obj = match body {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => {
            return Err(StoreError::Serialization(format!(
                "document body must be a JSON object: {}",
                id
            )))
        }
    };
    obj.remove("_rev");
    obj.insert("_id".to_string(), Value::String(id.to_string()));
    serde_json::to_string(&Value::Object(obj)).map_err(Into::into)
}

/// Body as read back: `_id` and `_rev` re-attached.
fn inflate_body(id: &str, rev: &str, body: &str) -> StoreResult<Value> {
    let mut value: Value = serde_json::from_str(body)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("_id".to_string(), Value::String(id.to_string()));
        obj.insert("_rev".to_string(), Value::String(rev.to_string()));
    }
    Ok(value)
}

fn compile_selector(selector: &Selector) -> (String, Vec<rusqlite::types::Value>) {
    let mut sql = String::new();
    let mut bindings = Vec::new();

    for (field, condition) in selector.clauses() {
        let expr = format!("json_extract(body, '$.{}')", field);
        match condition {
            Condition::Eq(v) => {
                sql.push_str(&format!(" AND {} = ?", expr));
                bindings.push(bind_value(v));
            }
            Condition::Gt(v) => {
                sql.push_str(&format!(" AND {} > ?", expr));
                bindings.push(bind_value(v));
            }
            Condition::Gte(v) => {
                sql.push_str(&format!(" AND {} >= ?", expr));
                bindings.push(bind_value(v));
            }
            Condition::Lt(v) => {
                sql.push_str(&format!(" AND {} < ?", expr));
                bindings.push(bind_value(v));
            }
            Condition::Lte(v) => {
                sql.push_str(&format!(" AND {} <= ?", expr));
                bindings.push(bind_value(v));
            }
            Condition::Contains(s) => {
                // The needle is literal text; LIKE metacharacters in it
                // must not act as wildcards.
                sql.push_str(&format!(" AND {} LIKE ? ESCAPE '\\'", expr));
                bindings.push(rusqlite::types::Value::Text(format!(
                    "%{}%",
                    escape_like(s)
                )));
            }
        }
    }

    (sql, bindings)
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}
