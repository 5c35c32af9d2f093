//! Database registry
//!
//! Resolves an entity kind (plus the signed-in user and, for sharded
//! kinds, a year) to a cached open handle. First resolution of a name
//! opens the file and provisions the kind's index set; later ones are
//! a map lookup. Resolution for any kind but `User` requires a
//! signed-in identity.

use atelier_model::{indexes_for, EntityKind};
use atelier_util::{current_year, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::namespace::{name_for_date, resolve_name, shard_name};
use crate::{IndexOutcome, LocalDatabase, RuntimeContext, StoreError, StoreResult};

impl RuntimeContext {
    /// Handle for a kind under the current identity. Sharded kinds
    /// route to the current year's shard; use [`shard_handle`] or
    /// [`handle_for_date`] to reach other years.
    ///
    /// [`shard_handle`]: RuntimeContext::shard_handle
    /// [`handle_for_date`]: RuntimeContext::handle_for_date
    pub fn handle(&self, kind: EntityKind) -> StoreResult<Arc<LocalDatabase>> {
        if kind.is_sharded() {
            return self.shard_handle(kind, current_year());
        }
        let user = self.auth_gate(kind)?;
        self.open_named(kind, resolve_name(kind, user.as_ref()))
    }

    /// Handle for one year shard of a sharded kind.
    pub fn shard_handle(&self, kind: EntityKind, year: i32) -> StoreResult<Arc<LocalDatabase>> {
        let user = self.auth_gate(kind)?;
        self.open_named(kind, shard_name(kind, user.as_ref(), year))
    }

    /// Handle for the shard holding documents dated `date`
    /// (RFC 3339 or `YYYY-MM-DD`).
    pub fn handle_for_date(&self, kind: EntityKind, date: &str) -> StoreResult<Arc<LocalDatabase>> {
        let user = self.auth_gate(kind)?;
        self.open_named(kind, name_for_date(kind, user.as_ref(), date))
    }

    /// The identity the name is resolved under. Everything except the
    /// global user database is gated on a signed-in user.
    fn auth_gate(&self, kind: EntityKind) -> StoreResult<Option<UserId>> {
        let user = self.current_user().map(|identity| identity.id);
        if kind.requires_auth() && user.is_none() {
            return Err(StoreError::AuthenticationRequired);
        }
        Ok(user)
    }

    fn open_named(&self, kind: EntityKind, name: String) -> StoreResult<Arc<LocalDatabase>> {
        let db = {
            let mut handles = self.handles.lock().unwrap();
            if let Some(db) = handles.get(&name) {
                return Ok(Arc::clone(db));
            }

            let path = self.data_dir.join(format!("{}.db", name));
            let db = Arc::new(LocalDatabase::open(name.clone(), &path)?);
            info!(db = name.as_str(), path = %path.display(), "Opened database");
            handles.insert(name, Arc::clone(&db));
            db
        };

        self.ensure_indexes(kind, &db)?;
        Ok(db)
    }

    /// Provision the kind's index set once per name per process
    /// lifetime. A failed index is logged and skipped; the database
    /// stays usable without it.
    fn ensure_indexes(&self, kind: EntityKind, db: &LocalDatabase) -> StoreResult<()> {
        {
            let ensured = self.ensured.lock().unwrap();
            if ensured.contains(db.name()) {
                return Ok(());
            }
        }

        for spec in indexes_for(kind) {
            match db.create_field_index(spec.fields) {
                Ok(IndexOutcome::Created) => {
                    debug!(db = db.name(), fields = ?spec.fields, "Index created")
                }
                Ok(IndexOutcome::AlreadyExists) => {
                    debug!(db = db.name(), fields = ?spec.fields, "Index already present")
                }
                Err(e) => {
                    warn!(db = db.name(), fields = ?spec.fields, error = %e, "Index creation failed")
                }
            }
        }

        self.ensured.lock().unwrap().insert(db.name().to_string());
        Ok(())
    }

    /// Close every handle and delete every database file under the data
    /// directory. Identity is untouched.
    pub fn wipe(&self) -> StoreResult<()> {
        self.handles.lock().unwrap().clear();
        self.ensured.lock().unwrap().clear();

        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "db") {
                std::fs::remove_file(&path)?;
            }
        }

        info!(data_dir = %self.data_dir.display(), "Local data wiped");
        Ok(())
    }
}
