//! Object-store user store
//! Mission: Keep the user collection as one JSON document without losing concurrent writes
//!
//! Every read-modify-write of a document runs under a per-key async lock
//! (`KeyedLocks`), so two registrations can never both read the same snapshot
//! and overwrite each other's append.

use crate::auth::models::{User, UserUpdate};
use crate::storage::{StoreError, StoreResult, UserStore};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USERS_KEY: &str = "auth/users.json";

/// Key/value blob storage addressed by string keys
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob at `key`. Readers see either the old or the new bytes.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(key.to_string(), data);
        Ok(())
    }
}

/// Blob store rooted at a local directory. Keys map to relative file paths.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create blob dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            bail!("invalid blob key: {key:?}");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read blob {}", path.display())),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }

        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("rename into {}", path.display()));
        }

        debug!("Wrote blob {} ({} bytes)", key, data.len());
        Ok(())
    }
}

/// Per-key async mutexes
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access is released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserDocument {
    users: Vec<User>,
}

/// User store holding the whole collection in one blob
pub struct BlobUserStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
    locks: KeyedLocks,
}

impl BlobUserStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_key(blobs, DEFAULT_USERS_KEY)
    }

    pub fn with_key(blobs: Arc<dyn BlobStore>, key: &str) -> Self {
        Self {
            blobs,
            key: key.to_string(),
            locks: KeyedLocks::new(),
        }
    }

    async fn load(&self) -> StoreResult<UserDocument> {
        match self.blobs.get(&self.key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(UserDocument::default()),
        }
    }

    async fn save(&self, doc: &UserDocument) -> StoreResult<()> {
        let bytes = serde_json::to_vec(doc).map_err(|e| StoreError::Backend(e.into()))?;
        self.blobs.put(&self.key, bytes).await?;
        Ok(())
    }

    async fn find(&self, pred: impl Fn(&User) -> bool) -> StoreResult<Option<User>> {
        let doc = self.load().await?;
        Ok(doc.users.into_iter().find(|u| pred(u)))
    }
}

#[async_trait]
impl UserStore for BlobUserStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let _guard = self.locks.lock(&self.key).await;
        let mut doc = self.load().await?;

        if doc.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict { field: "username" });
        }
        if user.email.is_some() && doc.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict { field: "email" });
        }

        doc.users.push(user.clone());
        self.save(&doc).await?;

        info!(
            "Created user: {} ({}), {} users in {}",
            user.username,
            user.id,
            doc.users.len(),
            self.key
        );
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> StoreResult<Option<User>> {
        self.find(|u| u.id == *id).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find(|u| u.username == username).await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find(|u| u.email.as_deref() == Some(email)).await
    }

    async fn update_user(&self, id: &Uuid, update: UserUpdate) -> StoreResult<User> {
        let _guard = self.locks.lock(&self.key).await;
        let mut doc = self.load().await?;

        let user = doc
            .users
            .iter_mut()
            .find(|u| u.id == *id)
            .ok_or(StoreError::NotFound)?;
        update.apply(user);
        let updated = user.clone();

        self.save(&doc).await?;
        Ok(updated)
    }

    fn backend(&self) -> &'static str {
        "blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(username: &str, email: Option<&str>) -> User {
        User::new(
            username.to_string(),
            email.map(str::to_string),
            username.to_string(),
            "$2b$04$placeholder".to_string(),
        )
    }

    fn memory_store() -> BlobUserStore {
        BlobUserStore::new(Arc::new(MemoryBlobStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = memory_store();
        let alice = store
            .create_user(user("alice", Some("alice@example.com")))
            .await
            .unwrap();

        assert_eq!(
            store.get_user_by_id(&alice.id).await.unwrap().unwrap().username,
            "alice"
        );
        assert!(store.get_user_by_username("alice").await.unwrap().is_some());
        assert!(store
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(store.get_user_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let store = memory_store();
        store
            .create_user(user("alice", Some("alice@example.com")))
            .await
            .unwrap();

        let err = store.create_user(user("alice", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "username" }));

        let err = store
            .create_user(user("alice2", Some("alice@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "email" }));

        store.create_user(user("bob", None)).await.unwrap();
        store.create_user(user("carol", None)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_do_not_lose_writes() {
        let store = Arc::new(memory_store());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create_user(user(&format!("user{i}"), None)).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..32 {
            assert!(
                store
                    .get_user_by_username(&format!("user{i}"))
                    .await
                    .unwrap()
                    .is_some(),
                "user{i} lost"
            );
        }
        assert_eq!(store.locks.len(), 1);
    }

    #[tokio::test]
    async fn test_update_user() {
        let store = memory_store();
        let alice = store.create_user(user("alice", None)).await.unwrap();

        let updated = store
            .update_user(
                &alice.id,
                UserUpdate {
                    avatar_url: Some("https://cdn.example.com/a.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.avatar_url.as_deref(), Some("https://cdn.example.com/a.png"));

        let err = store
            .update_user(&Uuid::new_v4(), UserUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_corrupt_document_reported() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .put(DEFAULT_USERS_KEY, b"{not json".to_vec())
            .await
            .unwrap();
        let store = BlobUserStore::new(blobs);

        let err = store.get_user_by_username("alice").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_fs_blob_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();

        assert!(blobs.get("auth/users.json").await.unwrap().is_none());
        blobs.put("auth/users.json", b"{}".to_vec()).await.unwrap();
        assert_eq!(blobs.get("auth/users.json").await.unwrap().unwrap(), b"{}");
        assert!(dir.path().join("auth").join("users.json").exists());
    }

    #[tokio::test]
    async fn test_fs_blob_store_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();

        assert!(blobs.get("../outside.json").await.is_err());
        assert!(blobs.put("/etc/passwd", vec![]).await.is_err());
        assert!(blobs.put("", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_fs_backed_user_store_persists() {
        let dir = TempDir::new().unwrap();

        {
            let store = BlobUserStore::new(Arc::new(FsBlobStore::new(dir.path()).unwrap()));
            store.create_user(user("alice", None)).await.unwrap();
        }

        let reopened = BlobUserStore::new(Arc::new(FsBlobStore::new(dir.path()).unwrap()));
        assert!(reopened
            .get_user_by_username("alice")
            .await
            .unwrap()
            .is_some());
    }
}
