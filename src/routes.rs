//! Router assembly
//!
//! The returned router expects `ConnectInfo<SocketAddr>`: serve it with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use crate::auth::{api as auth_api, auth_middleware, AuthState};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub fn build_router(auth_state: AuthState, rate_limiter: RateLimitLayer) -> Router {
    // Credential exchanges are rate limited per client IP
    let credential_routes = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/signin", post(auth_api::signin))
        .route("/api/auth/signup", post(auth_api::signup))
        .route_layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Bearer token required
    let protected_routes = Router::new()
        .route("/api/auth/update-profile", post(auth_api::update_profile))
        .route("/api/auth/me", get(auth_api::me))
        .route_layer(middleware::from_fn_with_state(
            auth_state.jwt_handler.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/auth/verify", post(auth_api::verify))
        .route("/health", get(auth_api::health_check));

    Router::new()
        .merge(credential_routes)
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(auth_state)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}
