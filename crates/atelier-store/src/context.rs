//! Runtime context: the signed-in identity plus the database registry
//!
//! One `RuntimeContext` lives for the whole process. The identity is
//! swappable at runtime (sign-in/sign-out); the registry caches one
//! open handle per concrete database name so repeated resolution is a
//! map lookup, not a file open.

use atelier_config::CoreConfig;
use atelier_util::UserId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

use crate::{LocalDatabase, StoreResult};

/// The signed-in user as the store needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: UserId,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Process-wide store state. Cheap to share behind an `Arc`.
pub struct RuntimeContext {
    pub(crate) data_dir: PathBuf,
    pub(crate) identity: RwLock<Option<UserIdentity>>,
    pub(crate) handles: Mutex<HashMap<String, Arc<LocalDatabase>>>,
    /// Concrete names whose index set has been provisioned this
    /// process lifetime.
    pub(crate) ensured: Mutex<HashSet<String>>,
}

impl RuntimeContext {
    /// Create a context rooted at `data_dir`, creating the directory if
    /// needed. Starts signed out.
    pub fn new(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            identity: RwLock::new(None),
            handles: Mutex::new(HashMap::new()),
            ensured: Mutex::new(HashSet::new()),
        })
    }

    pub fn from_config(config: &CoreConfig) -> StoreResult<Self> {
        Self::new(&config.data_dir)
    }

    /// Install the signed-in identity. Handles opened for a previous
    /// identity stay cached; their names are user-disjoint.
    pub fn sign_in(&self, identity: UserIdentity) {
        info!(user = identity.id.as_str(), "User signed in");
        *self.identity.write().unwrap() = Some(identity);
    }

    pub fn sign_out(&self) {
        if let Some(identity) = self.identity.write().unwrap().take() {
            info!(user = identity.id.as_str(), "User signed out");
        }
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.identity.read().unwrap().clone()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(dir.path()).unwrap();
        assert!(ctx.current_user().is_none());
    }

    #[test]
    fn sign_in_and_out_swap_the_identity() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(dir.path()).unwrap();

        ctx.sign_in(UserIdentity::new("u1", "Alice"));
        assert_eq!(ctx.current_user().unwrap().id.as_str(), "u1");

        ctx.sign_in(UserIdentity::new("u2", "Bob"));
        assert_eq!(ctx.current_user().unwrap().id.as_str(), "u2");

        ctx.sign_out();
        assert!(ctx.current_user().is_none());

        // Signing out twice is harmless.
        ctx.sign_out();
    }

    #[test]
    fn creates_the_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/data");
        let ctx = RuntimeContext::new(&nested).unwrap();
        assert!(ctx.data_dir().is_dir());
    }
}
