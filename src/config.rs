//! Server configuration
//!
//! Every option is a CLI flag that can also come from the environment
//! (after `.env` files are loaded).

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

use crate::middleware::RateLimitConfig;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";
const MIN_SECRET_LEN: usize = 32;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;
/// One year
const MAX_TOKEN_TTL_HOURS: u32 = 8760;

/// Where user accounts live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// SQLite database file
    Sqlite,
    /// JSON document in a directory-backed object store
    Blob,
    /// JSON document in process memory (lost on restart)
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "chatroom")]
#[command(about = "Authentication service for the chatroom web app")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "CHATROOM_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// HMAC secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value = "24")]
    pub token_ttl_hours: u32,

    /// User storage backend
    #[arg(long, env = "AUTH_STORAGE", value_enum, default_value = "sqlite")]
    pub storage: StorageBackend,

    /// SQLite database path (sqlite backend)
    #[arg(long, env = "AUTH_DB_PATH", default_value = "chatroom_auth.db")]
    pub auth_db_path: String,

    /// Object store root directory (blob backend)
    #[arg(long, env = "AUTH_BLOB_DIR", default_value = "blob-data")]
    pub blob_dir: String,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Credential requests allowed per client IP per minute
    #[arg(long, env = "AUTH_RATE_LIMIT", default_value = "30")]
    pub rate_limit_per_minute: u32,

    /// Extra requests tolerated above the per-minute limit
    #[arg(long, env = "AUTH_RATE_LIMIT_BURST", default_value = "10")]
    pub rate_limit_burst: u32,

    /// Allow the built-in development secret when JWT_SECRET is unset
    #[arg(long, env = "CHATROOM_DEV", default_value = "false")]
    pub dev: bool,
}

impl Config {
    /// Check option ranges and resolve the signing secret
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            bail!(
                "bcrypt cost must be between {} and {}, got {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST,
                self.bcrypt_cost
            );
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            bail!(
                "token TTL must be between 1 and {} hours, got {}",
                MAX_TOKEN_TTL_HOURS,
                self.token_ttl_hours
            );
        }
        if self.rate_limit_per_minute == 0 {
            bail!("rate limit must allow at least one request per minute");
        }
        self.jwt_secret().map(|_| ())
    }

    pub fn jwt_secret(&self) -> Result<String> {
        match self.jwt_secret.as_deref() {
            Some(secret) if secret.len() >= MIN_SECRET_LEN => Ok(secret.to_string()),
            Some(secret) if self.dev => {
                warn!("JWT_SECRET is shorter than {MIN_SECRET_LEN} bytes; accepted in dev mode");
                Ok(secret.to_string())
            }
            Some(_) => bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"),
            None if self.dev => {
                warn!("JWT_SECRET not set, using the development secret");
                Ok(DEV_JWT_SECRET.to_string())
            }
            None => bail!("JWT_SECRET is required (or pass --dev)"),
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.token_ttl_hours))
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_per_minute,
            window: Duration::from_secs(60),
            burst: self.rate_limit_burst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["chatroom"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--jwt-secret", "0123456789abcdef0123456789abcdef"]);
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.token_ttl().num_hours(), 24);
        assert_eq!(config.rate_limit().max_requests, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_rules() {
        let short = parse(&["--jwt-secret", "short"]);
        assert!(short.validate().is_err());

        let short_dev = parse(&["--jwt-secret", "short", "--dev"]);
        assert_eq!(short_dev.jwt_secret().unwrap(), "short");

        let dev = parse(&["--dev"]);
        assert_eq!(dev.jwt_secret().unwrap(), DEV_JWT_SECRET);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let cost = parse(&["--dev", "--bcrypt-cost", "2"]);
        assert!(cost.validate().is_err());

        let ttl = parse(&["--dev", "--token-ttl-hours", "0"]);
        assert!(ttl.validate().is_err());

        let ttl = parse(&["--dev", "--token-ttl-hours", "4000000000"]);
        assert!(ttl.validate().is_err());

        let year = parse(&["--dev", "--token-ttl-hours", "8760"]);
        assert!(year.validate().is_ok());
    }

    #[test]
    fn test_storage_backend_values() {
        assert_eq!(parse(&["--storage", "blob"]).storage, StorageBackend::Blob);
        assert_eq!(parse(&["--storage", "memory"]).storage, StorageBackend::Memory);
        assert!(Config::try_parse_from(["chatroom", "--storage", "postgres"]).is_err());
    }
}
