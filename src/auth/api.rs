//! Authentication API Endpoints
//! Mission: Register, sign in, verify sessions and update profiles

use crate::auth::{
    jwt::JwtHandler,
    models::{
        Claims, LoginRequest, RegisterRequest, SessionResponse, SigninRequest, SignupRequest,
        UpdateProfileRequest, UpdateProfileResponse, User, UserEnvelope, UserResponse, UserUpdate,
        VerifyRequest,
    },
    password::{hash_password, verify_password},
    validation,
};
use crate::storage::{StoreError, UserStore};
use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Stand-in password hashed once per state so unknown users still pay a bcrypt verify
const PLACEHOLDER_PASSWORD: &str = "chatroom-placeholder-password";

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<dyn UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub bcrypt_cost: u32,
    placeholder_hash: Arc<OnceCell<String>>,
}

impl AuthState {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        jwt_handler: Arc<JwtHandler>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            user_store,
            jwt_handler,
            bcrypt_cost,
            placeholder_hash: Arc::new(OnceCell::new()),
        }
    }

    fn issue_session(&self, user: &User) -> Result<SessionResponse, AuthApiError> {
        let (token, expires_in) = self.jwt_handler.generate_token(user).map_err(|e| {
            error!("Failed to issue token for {}: {e:#}", user.id);
            AuthApiError::InternalError
        })?;

        Ok(SessionResponse {
            user: UserResponse::from_user(user),
            token,
            expires_in,
        })
    }

    /// Resolve token claims to the stored user
    async fn user_for_claims(&self, claims: &Claims) -> Result<User, AuthApiError> {
        let id = claims.user_id().ok_or(AuthApiError::InvalidToken)?;
        self.user_store
            .get_user_by_id(&id)
            .await?
            .ok_or(AuthApiError::InvalidToken)
    }

    async fn hash(&self, password: String) -> Result<String, AuthApiError> {
        hash_password(password, self.bcrypt_cost).await.map_err(|e| {
            error!("{e:#}");
            AuthApiError::InternalError
        })
    }

    /// Run a full bcrypt verify against the placeholder hash
    async fn burn_password_check(&self, password: String) {
        let placeholder = self
            .placeholder_hash
            .get_or_try_init(|| hash_password(PLACEHOLDER_PASSWORD.to_string(), self.bcrypt_cost))
            .await;
        match placeholder {
            Ok(hash) => {
                if let Err(e) = verify_password(password, hash.clone()).await {
                    error!("Placeholder password check failed: {e:#}");
                }
            }
            Err(e) => error!("Failed to build placeholder hash: {e:#}"),
        }
    }

    /// Check a password against a possibly-missing user
    async fn check_password(
        &self,
        user: Option<User>,
        password: String,
    ) -> Result<User, AuthApiError> {
        let Some(user) = user else {
            self.burn_password_check(password).await;
            return Err(AuthApiError::InvalidCredentials);
        };

        let valid = verify_password(password, user.password_hash.clone())
            .await
            .map_err(|e| {
                error!("Password check failed for {}: {e:#}", user.id);
                AuthApiError::InternalError
            })?;

        if valid {
            Ok(user)
        } else {
            Err(AuthApiError::InvalidCredentials)
        }
    }
}

/// JSON body extractor that answers 400 on any parse failure
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AuthApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>, AuthApiError> {
    let username = validation::username(&payload.username)?;
    info!("Login attempt: {}", username);

    let user = state.user_store.get_user_by_username(&username).await?;
    let user = state
        .check_password(user, payload.password)
        .await
        .map_err(|e| {
            warn!("Failed login attempt: {}", username);
            e
        })?;

    info!("Login successful: {} ({})", user.username, user.id);
    Ok(Json(state.issue_session(&user)?))
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Json<SessionResponse>, AuthApiError> {
    let username = validation::new_username(&payload.username)?;
    validation::new_password(&payload.password)?;
    let display_name = match payload.display_name.as_deref() {
        Some(name) => validation::display_name(name)?,
        None => username.clone(),
    };

    let password_hash = state.hash(payload.password).await?;
    let user = state
        .user_store
        .create_user(User::new(username, None, display_name, password_hash))
        .await?;

    info!("Registered user: {} ({})", user.username, user.id);
    Ok(Json(state.issue_session(&user)?))
}

/// Email sign-in endpoint - POST /api/auth/signin
pub async fn signin(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<SigninRequest>,
) -> Result<Json<SessionResponse>, AuthApiError> {
    let email = validation::email(&payload.email)?;

    let user = state.user_store.get_user_by_email(&email).await?;
    let user = state
        .check_password(user, payload.password)
        .await
        .map_err(|e| {
            warn!("Failed sign-in attempt: {}", email);
            e
        })?;

    info!("Sign-in successful: {} ({})", user.username, user.id);
    Ok(Json(state.issue_session(&user)?))
}

/// Email sign-up endpoint - POST /api/auth/signup
///
/// The normalized email doubles as the username.
pub async fn signup(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<Json<SessionResponse>, AuthApiError> {
    let display_name = validation::display_name(&payload.name)?;
    let email = validation::email(&payload.email)?;
    validation::new_password(&payload.password)?;

    let password_hash = state.hash(payload.password).await?;
    let user = state
        .user_store
        .create_user(User::new(email.clone(), Some(email), display_name, password_hash))
        .await?;

    info!("Signed up user: {} ({})", user.username, user.id);
    Ok(Json(state.issue_session(&user)?))
}

/// Token verification - POST /api/auth/verify
pub async fn verify(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<VerifyRequest>,
) -> Result<Json<UserEnvelope>, AuthApiError> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AuthApiError::InvalidToken);
    }

    let claims = state
        .jwt_handler
        .validate_token(token)
        .map_err(|_| AuthApiError::InvalidToken)?;
    let user = state.user_for_claims(&claims).await?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from_user(&user),
    }))
}

/// Current user - GET /api/auth/me (behind auth middleware)
pub async fn me(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserEnvelope>, AuthApiError> {
    let user = state.user_for_claims(&claims).await?;
    Ok(Json(UserEnvelope {
        user: UserResponse::from_user(&user),
    }))
}

/// Profile update - POST /api/auth/update-profile (behind auth middleware)
pub async fn update_profile(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UpdateProfileResponse>, AuthApiError> {
    let id = claims.user_id().ok_or(AuthApiError::InvalidToken)?;

    let mut update = UserUpdate::default();
    if let Some(name) = payload.display_name.as_deref() {
        update.display_name = Some(validation::display_name(name)?);
    }
    if let Some(url) = payload.avatar_url.as_deref() {
        update.avatar_url = Some(validation::avatar_url(url)?);
    }
    if let Some(password) = payload.new_password {
        validation::new_password(&password)?;
        update.password_hash = Some(state.hash(password).await?);
    }
    if update.is_empty() {
        return Err(AuthApiError::BadRequest("Nothing to update".into()));
    }

    let password_changed = update.password_hash.is_some();
    let user = state
        .user_store
        .update_user(&id, update)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AuthApiError::InvalidToken,
            other => other.into(),
        })?;

    info!(
        "Profile updated: {} ({}), password changed: {}",
        user.username, user.id, password_changed
    );

    Ok(Json(UpdateProfileResponse {
        success: true,
        user: UserResponse::from_user(&user),
    }))
}

/// Health check - GET /health
pub async fn health_check(State(state): State<AuthState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "storage": state.user_store.backend(),
    }))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    BadRequest(String),
    WeakPassword,
    InvalidCredentials,
    InvalidToken,
    UserAlreadyExists(&'static str),
    InternalError,
}

impl From<StoreError> for AuthApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => {
                warn!("Duplicate {} rejected", field);
                AuthApiError::UserAlreadyExists(field)
            }
            other => {
                error!("User store failure: {other:#}");
                AuthApiError::InternalError
            }
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "weak_password",
                format!(
                    "Password must be at least {} characters and at most {} bytes",
                    validation::MIN_PASSWORD_LEN,
                    validation::MAX_PASSWORD_BYTES
                ),
            ),
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials".to_string(),
            ),
            AuthApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid or expired token".to_string(),
            ),
            AuthApiError::UserAlreadyExists(field) => (
                StatusCode::CONFLICT,
                "user_exists",
                format!("A user with this {field} already exists"),
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteUserStore;

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let invalid_token = AuthApiError::InvalidToken.into_response();
        assert_eq!(invalid_token.status(), StatusCode::UNAUTHORIZED);

        let weak = AuthApiError::WeakPassword.into_response();
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);

        let conflict = AuthApiError::UserAlreadyExists("username").into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let internal = AuthApiError::InternalError.into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_error_mapping() {
        let conflict: AuthApiError = StoreError::Conflict { field: "email" }.into();
        assert!(matches!(conflict, AuthApiError::UserAlreadyExists("email")));

        let corrupt: AuthApiError = StoreError::Corrupt("bad json".into()).into();
        assert!(matches!(corrupt, AuthApiError::InternalError));
    }

    #[tokio::test]
    async fn test_check_password_hides_unknown_user() {
        let state = AuthState::new(
            Arc::new(SqliteUserStore::in_memory().unwrap()),
            Arc::new(JwtHandler::new("test-secret-key-12345")),
            4,
        );

        let err = state
            .check_password(None, "whatever".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthApiError::InvalidCredentials));
        let placeholder = state.placeholder_hash.get().unwrap();
        assert!(placeholder.starts_with("$2b$04$"));

        // the placeholder password itself must not unlock an unknown user
        let err = state
            .check_password(None, PLACEHOLDER_PASSWORD.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthApiError::InvalidCredentials));

        let hash = state.hash("secret1".to_string()).await.unwrap();
        let user = User::new("alice".into(), None, "alice".into(), hash);
        assert!(state
            .check_password(Some(user.clone()), "secret1".to_string())
            .await
            .is_ok());
        assert!(matches!(
            state.check_password(Some(user), "nope".to_string()).await,
            Err(AuthApiError::InvalidCredentials)
        ));
    }
}
