//! Authentication Module
//! Mission: bcrypt credentials, signed expiring session tokens, typed endpoints

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod validation;

pub use api::AuthState;
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
