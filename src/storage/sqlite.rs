//! SQLite user store
//! Mission: Store user accounts in a relational table with UNIQUE identities

use crate::auth::models::{User, UserUpdate};
use crate::storage::{StoreError, StoreResult, UserStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, username, email, display_name, avatar_url, password_hash, created_at, updated_at";

/// User storage with SQLite backend
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    /// Open (or create) the database file and initialize the schema
    pub fn new(db_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("open auth db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory auth db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE,
                display_name TEXT NOT NULL,
                avatar_url TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("create users table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn get_user_where(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        let user = conn
            .query_row(&sql, params![value], row_to_user)
            .optional()?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO users (id, username, email, display_name, avatar_url, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.display_name,
                user.avatar_url,
                user.password_hash,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                info!("Created user: {} ({})", user.username, user.id);
                Ok(user)
            }
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                let field = if msg.contains("users.email") {
                    "email"
                } else {
                    "username"
                };
                Err(StoreError::Conflict { field })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user_by_id(&self, id: &Uuid) -> StoreResult<Option<User>> {
        self.get_user_where("id", &id.to_string()).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.get_user_where("username", username).await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.get_user_where("email", email).await
    }

    async fn update_user(&self, id: &Uuid, update: UserUpdate) -> StoreResult<User> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let mut user = conn
            .query_row(&sql, params![id.to_string()], row_to_user)
            .optional()?
            .ok_or(StoreError::NotFound)?;

        update.apply(&mut user);

        conn.execute(
            "UPDATE users SET display_name = ?2, avatar_url = ?3, password_hash = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.display_name,
                user.avatar_url,
                user.password_hash,
                user.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(user)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(User {
        id: Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        username: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
