//! Chatroom authentication server
//! Mission: Serve registration, sign-in and session endpoints over one user store

use anyhow::{Context, Result};
use chatroom_backend::{
    auth::{AuthState, JwtHandler},
    build_router,
    config::{Config, StorageBackend},
    middleware::RateLimitLayer,
    storage::{BlobUserStore, FsBlobStore, MemoryBlobStore, SqliteUserStore, UserStore},
};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    info!("Chatroom auth server starting");

    let user_store = open_user_store(&config)?;
    let jwt_handler = Arc::new(JwtHandler::with_ttl(
        &config.jwt_secret()?,
        config.token_ttl(),
    ));
    let auth_state = AuthState::new(user_store.clone(), jwt_handler, config.bcrypt_cost);

    info!(
        "Authentication initialized: storage={}, token_ttl={}h, bcrypt_cost={}",
        user_store.backend(),
        config.token_ttl_hours,
        config.bcrypt_cost
    );

    let rate_limiter = RateLimitLayer::new(config.rate_limit());
    rate_limiter.spawn_cleanup();

    let app = build_router(auth_state, rate_limiter);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("API server listening on {}", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn open_user_store(config: &Config) -> Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match config.storage {
        StorageBackend::Sqlite => {
            info!("Opening user database at {}", config.auth_db_path);
            Arc::new(SqliteUserStore::new(&config.auth_db_path)?)
        }
        StorageBackend::Blob => {
            info!("Using object store at {}", config.blob_dir);
            let blobs = FsBlobStore::new(&config.blob_dir)?;
            Arc::new(BlobUserStore::new(Arc::new(blobs)))
        }
        StorageBackend::Memory => {
            warn!("In-memory user store: accounts are lost on restart");
            Arc::new(BlobUserStore::new(Arc::new(MemoryBlobStore::new())))
        }
    };
    Ok(store)
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatroom_backend=debug,chatroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the crate directory when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
