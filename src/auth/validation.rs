//! Input validation for credential and profile fields.
//!
//! Each helper returns the normalized value to store.

use crate::auth::api::AuthApiError;

pub const MIN_PASSWORD_LEN: usize = 6;
/// bcrypt only reads the first 72 bytes of its input
pub const MAX_PASSWORD_BYTES: usize = 72;
const MAX_USERNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;
const MAX_DISPLAY_NAME_LEN: usize = 80;
const MAX_AVATAR_URL_LEN: usize = 2048;

pub fn username(raw: &str) -> Result<String, AuthApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AuthApiError::BadRequest("Username is required".into()));
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(AuthApiError::BadRequest(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AuthApiError::BadRequest(
            "Username must not contain whitespace".into(),
        ));
    }
    Ok(name.to_string())
}

/// Username for a new account. `@` is reserved for email sign-ups, whose
/// username is their address.
pub fn new_username(raw: &str) -> Result<String, AuthApiError> {
    let name = username(raw)?;
    if name.contains('@') {
        return Err(AuthApiError::BadRequest(
            "Username must not contain '@'; use sign-up with an email instead".into(),
        ));
    }
    Ok(name)
}

pub fn email(raw: &str) -> Result<String, AuthApiError> {
    let email = raw.trim().to_lowercase();
    let invalid = || AuthApiError::BadRequest("A valid email address is required".into());

    if email.len() < 3 || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }
    Ok(email)
}

/// Policy for new passwords. Login does not apply it.
pub fn new_password(raw: &str) -> Result<(), AuthApiError> {
    if raw.chars().count() < MIN_PASSWORD_LEN || raw.len() > MAX_PASSWORD_BYTES {
        return Err(AuthApiError::WeakPassword);
    }
    Ok(())
}

pub fn display_name(raw: &str) -> Result<String, AuthApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AuthApiError::BadRequest("Name must not be empty".into()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(AuthApiError::BadRequest(format!(
            "Name must be at most {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn avatar_url(raw: &str) -> Result<String, AuthApiError> {
    let url = raw.trim();
    if url.len() > MAX_AVATAR_URL_LEN
        || !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(AuthApiError::BadRequest(
            "Avatar URL must be an http(s) URL".into(),
        ));
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert_eq!(username("  alice ").unwrap(), "alice");
        assert!(username("").is_err());
        assert!(username("   ").is_err());
        assert!(username("al ice").is_err());
        assert!(username(&"a".repeat(65)).is_err());
        assert_eq!(username("dana@example.com").unwrap(), "dana@example.com");
    }

    #[test]
    fn test_new_username_reserves_at_sign() {
        assert_eq!(new_username(" dana ").unwrap(), "dana");
        assert!(new_username("dana@example.com").is_err());
        assert!(new_username("@dana").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(email(" Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(email("alice").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("alice@localhost").is_err());
        assert!(email("a@b@c.com").is_err());
        assert!(email("alice@.com").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(matches!(new_password("abc"), Err(AuthApiError::WeakPassword)));
        assert!(new_password("abcdef").is_ok());
        assert!(new_password("abcdefg").is_ok());
        assert!(new_password(&"x".repeat(72)).is_ok());
        assert!(matches!(
            new_password(&"x".repeat(73)),
            Err(AuthApiError::WeakPassword)
        ));
        // 24 three-byte chars fit, 25 do not
        assert!(new_password(&"€".repeat(24)).is_ok());
        assert!(new_password(&"€".repeat(25)).is_err());
    }

    #[test]
    fn test_profile_fields() {
        assert_eq!(display_name(" Alice ").unwrap(), "Alice");
        assert!(display_name("").is_err());
        assert!(avatar_url("https://cdn.example.com/a.png").is_ok());
        assert!(avatar_url("javascript:alert(1)").is_err());
    }
}
