//! Credential storage.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;
use tokio::sync::RwLock;

use super::identity::Identity;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The username is already taken.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend failure. The caller may retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unavailable(format!("Corrupt identity record: {err}"))
    }
}

/// Persistence for identities.
///
/// `create` must enforce username uniqueness atomically: of two concurrent
/// creates for the same username, exactly one succeeds and the other gets
/// `StoreError::DuplicateKey`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an identity by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    /// Persist a new identity.
    async fn create(&self, identity: Identity) -> Result<Identity, StoreError>;

    /// List all identities.
    async fn list(&self) -> Result<Vec<Identity>, StoreError>;

    /// Count identities.
    async fn count(&self) -> Result<usize, StoreError>;
}

const USERNAME_INDEX_PREFIX: &str = "idx:username:";

/// Credential store backed by sled.
pub struct SledCredentialStore {
    tree: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create a credential store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    /// Create a credential store inside an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("identities")?;
        Ok(Self { tree })
    }

    fn get(&self, id: &[u8]) -> Result<Option<Identity>, StoreError> {
        match self.tree.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let index_key = format!("{USERNAME_INDEX_PREFIX}{username}");
        match self.tree.get(index_key.as_bytes())? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        let index_key = format!("{USERNAME_INDEX_PREFIX}{}", identity.username);
        let value = serde_json::to_vec(&identity)?;

        // Index check and both writes commit together or not at all.
        let result: Result<(), TransactionError<()>> = self.tree.transaction(|tx| {
            if tx.get(index_key.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(()));
            }
            tx.insert(index_key.as_bytes(), identity.id.as_bytes())?;
            tx.insert(identity.id.as_bytes(), value.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(())) => {
                return Err(StoreError::DuplicateKey(identity.username));
            }
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }

        self.tree.flush_async().await?;
        Ok(identity)
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let mut identities = Vec::new();

        for result in &self.tree {
            let (key, value) = result?;

            // Skip index entries
            if key.starts_with(USERNAME_INDEX_PREFIX.as_bytes()) {
                continue;
            }

            identities.push(serde_json::from_slice(&value)?);
        }

        Ok(identities)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .tree
            .scan_prefix(USERNAME_INDEX_PREFIX.as_bytes())
            .count())
    }
}

impl std::fmt::Debug for SledCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledCredentialStore")
            .field("entries", &self.tree.len())
            .finish()
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.read().await.get(username).cloned())
    }

    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        use std::collections::hash_map::Entry;

        match self.identities.write().await.entry(identity.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(identity.username)),
            Entry::Vacant(slot) => Ok(slot.insert(identity).clone()),
        }
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.identities.read().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.identities.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tollgate_core::Role;

    fn identity(username: &str, role: Role) -> Identity {
        Identity::new(username, "$argon2id$stub".to_string(), role)
    }

    #[tokio::test]
    async fn test_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledCredentialStore::open(temp_dir.path()).unwrap();

        assert_eq!(store.count().await.unwrap(), 0);

        let created = store.create(identity("admin", Role::Admin)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let found = store.find_by_username("admin").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Role::Admin);

        assert!(store.find_by_username("Admin").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SledCredentialStore::open(temp_dir.path()).unwrap();
            store.create(identity("editor", Role::Editor)).await.unwrap();
        }

        let reopened = SledCredentialStore::open(temp_dir.path()).unwrap();
        let found = reopened.find_by_username("editor").await.unwrap();
        assert_eq!(found.unwrap().role, Role::Editor);
    }

    #[tokio::test]
    async fn test_sled_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledCredentialStore::open(temp_dir.path()).unwrap();

        store.create(identity("admin", Role::Admin)).await.unwrap();
        let result = store.create(identity("admin", Role::User)).await;

        assert!(matches!(result, Err(StoreError::DuplicateKey(name)) if name == "admin"));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.find_by_username("admin").await.unwrap().unwrap().role,
            Role::Admin
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_one_wins() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SledCredentialStore::open(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create(identity("racer", Role::User)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(StoreError::DuplicateKey(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        store.create(identity("user", Role::User)).await.unwrap();

        let result = store.create(identity("user", Role::Admin)).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }
}
