//! Chatroom Backend Library
//!
//! Authentication service for the chatroom web app: registration and sign-in,
//! signed session tokens, profile updates, and the user stores behind them.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod routes;
pub mod storage;

pub use routes::build_router;
