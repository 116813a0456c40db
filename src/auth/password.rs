//! Password hashing
//!
//! bcrypt is deliberately slow, so both directions run on the blocking pool.

use anyhow::{Context, Result};
use bcrypt::{hash, verify};

pub async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("Failed to hash password")
}

/// Compare a candidate password with a stored bcrypt hash
pub async fn verify_password(password: String, password_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .context("password verification task failed")?
        .context("Failed to verify password")
}
