//! JWT Token Handler
//! Mission: Generate and validate signed, expiring session tokens

use crate::auth::models::{Claims, User};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and 24-hour tokens
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::hours(24))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Generate a JWT token for a user, returning the token and its lifetime in seconds
    pub fn generate_token(&self, user: &User) -> Result<(String, i64)> {
        self.generate_token_at(user, Utc::now())
    }

    /// Same as `generate_token`, with an explicit issue time
    pub fn generate_token_at(&self, user: &User, issued_at: DateTime<Utc>) -> Result<(String, i64)> {
        let expiration = issued_at
            .checked_add_signed(self.ttl)
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at.timestamp(),
            iat: issued_at.timestamp(),
            exp: expiration.timestamp(),
        };

        debug!(
            "Generating JWT for user {} ({}), expires at {}",
            user.username, user.id, expiration
        );

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok((token, self.ttl.num_seconds()))
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        self.validate_token_at(token, Utc::now())
    }

    /// Validate against an explicit clock. A token is valid strictly before `exp`.
    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        // exp is enforced below against the caller's clock
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let decoded = decode::<Claims>(token, &self.decoding_key, &validation)
            .context("Invalid or expired token")?;

        if now.timestamp() >= decoded.claims.exp {
            bail!("Token expired");
        }

        debug!("Validated JWT for user {}", decoded.claims.username);

        Ok(decoded.claims)
    }
}
