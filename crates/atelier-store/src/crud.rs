//! Generic document CRUD over one database handle
//!
//! `DocumentStore<T>` binds a typed entity to a resolved handle. All
//! operations address documents by identifier within that handle; the
//! caller picks the right handle (and shard) through the registry
//! first.

use atelier_model::{DocumentMeta, Entity};
use atelier_util::{timestamp, DocumentId};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::{LocalDatabase, Selector, StoreError, StoreResult};

/// Fields the store owns. Patches never touch them.
const PROTECTED_FIELDS: [&str; 4] = ["_id", "_rev", "type", "created_at"];

/// A partial update: top-level fields replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    fields: Vec<(String, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one field. Protected fields (`_id`, `_rev`, `type`,
    /// `created_at`) are ignored.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        if PROTECTED_FIELDS.contains(&field.as_str()) {
            debug!(field = field.as_str(), "Ignoring patch of protected field");
            return self;
        }
        self.fields.push((field, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

/// Typed CRUD over one resolved handle.
pub struct DocumentStore<T: Entity> {
    db: Arc<LocalDatabase>,
    _marker: PhantomData<T>,
}

impl<T: Entity> DocumentStore<T> {
    pub fn new(db: Arc<LocalDatabase>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    pub fn database(&self) -> &Arc<LocalDatabase> {
        &self.db
    }

    /// Persist a new document. Identity fields are assigned here:
    /// whatever metadata the value carried is replaced with a fresh
    /// identifier, the kind tag, and creation timestamps.
    pub fn create(&self, mut doc: T) -> StoreResult<T> {
        *doc.meta_mut() = DocumentMeta::new(T::KIND);

        let body = serde_json::to_value(&doc)?;
        let id = doc.meta().id.clone();
        let rev = self.db.put(id.as_str(), None, &body)?;

        doc.meta_mut().rev = Some(rev);
        debug!(db = self.db.name(), id = id.as_str(), "Document created");
        Ok(doc)
    }

    pub fn find_by_id(&self, id: &DocumentId) -> StoreResult<Option<T>> {
        match self.db.get(id.as_str())? {
            Some(stored) => Ok(Some(serde_json::from_value(stored.body)?)),
            None => Ok(None),
        }
    }

    /// Every live document of this kind in the handle.
    pub fn find_all(&self) -> StoreResult<Vec<T>> {
        self.find_where(&Selector::kind(T::KIND))
    }

    pub fn find_where(&self, selector: &Selector) -> StoreResult<Vec<T>> {
        let docs = self.db.query(selector)?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .collect()
    }

    /// Apply a patch to an existing document. Fails with
    /// [`StoreError::NotFound`] when the identifier does not exist, and
    /// with [`StoreError::Conflict`] if the document changed under a
    /// concurrent writer.
    pub fn update(&self, id: &DocumentId, patch: Patch) -> StoreResult<T> {
        let stored = self
            .db
            .get(id.as_str())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut body = stored.body;
        let obj = body
            .as_object_mut()
            .ok_or_else(|| StoreError::Serialization(format!("malformed document: {}", id)))?;
        for (field, value) in patch.fields() {
            obj.insert(field.clone(), value.clone());
        }
        obj.insert("updated_at".to_string(), Value::String(timestamp()));

        let rev = self.db.put(id.as_str(), Some(&stored.rev), &body)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("_rev".to_string(), Value::String(rev));
        }

        debug!(db = self.db.name(), id = id.as_str(), "Document updated");
        serde_json::from_value(body).map_err(Into::into)
    }

    /// Remove a document. Returns whether anything was removed; an
    /// absent identifier is not an error.
    pub fn remove(&self, id: &DocumentId) -> StoreResult<bool> {
        match self.db.get(id.as_str())? {
            Some(stored) => {
                self.db.delete(id.as_str(), &stored.rev)?;
                debug!(db = self.db.name(), id = id.as_str(), "Document removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
