//! User Storage
//! Mission: One user data model behind pluggable persistence backends
//!
//! - `SqliteUserStore`: relational store, parametrized SQL
//! - `BlobUserStore`: the whole collection as one JSON document in a key/value object store

pub mod blob;
pub mod sqlite;

use crate::auth::models::{User, UserUpdate};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use blob::{BlobStore, BlobUserStore, FsBlobStore, KeyedLocks, MemoryBlobStore};
pub use sqlite::SqliteUserStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field} already exists")]
    Conflict { field: &'static str },

    #[error("user not found")]
    NotFound,

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence for user accounts. Usernames and emails are unique per store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user, failing with `Conflict` on a taken username or email
    async fn create_user(&self, user: User) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: &Uuid) -> StoreResult<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// `email` must already be normalized (trimmed, lowercased)
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn update_user(&self, id: &Uuid, update: UserUpdate) -> StoreResult<User>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
