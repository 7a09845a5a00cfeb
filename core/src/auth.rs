use std::fmt::Write;

use anyhow::{Context, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::db::Database;
use crate::models::User;

pub const MIN_PASSWORD_LEN: usize = 6;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Rejections the user can act on. Carried inside `anyhow::Error`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    WeakPassword,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("Invalid login credentials")]
    InvalidCredentials,
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn random_hex() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    to_hex(&bytes)
}

/// Session tokens are stored as their SHA-256 digest only.
fn hash_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

pub fn sign_up(db: &Database, email: &str, password: &str) -> Result<User> {
    let email = normalize_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword.into());
    }
    if db.get_credentials(&email)?.is_some() {
        return Err(AuthError::EmailTaken.into());
    }

    let password_hash =
        bcrypt::hash(password, HASH_COST).context("Failed to hash password")?;
    let user = db.insert_user(&email, &password_hash)?;
    info!(user_id = user.id, "created account");
    Ok(user)
}

/// Verify credentials and open a new session. Returns the user and the
/// plaintext token, which is never stored.
pub fn sign_in(db: &Database, email: &str, password: &str) -> Result<(User, String)> {
    let Ok(email) = normalize_email(email) else {
        return Err(AuthError::InvalidCredentials.into());
    };
    let Some(creds) = db.get_credentials(&email)? else {
        return Err(AuthError::InvalidCredentials.into());
    };
    // A stored hash bcrypt cannot parse never matches.
    if !bcrypt::verify(password, &creds.password_hash).unwrap_or(false) {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = random_hex();
    db.insert_session(&hash_token(&token), creds.user.id)?;
    info!(user_id = creds.user.id, "signed in");
    Ok((creds.user, token))
}

/// Revoke a session. Returns false when the token was not active.
pub fn sign_out(db: &Database, token: &str) -> Result<bool> {
    db.delete_session(&hash_token(token))
}

pub fn authenticate(db: &Database, token: &str) -> Result<Option<User>> {
    if token.is_empty() {
        return Ok(None);
    }
    db.get_session_user(&hash_token(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_and_sign_in() {
        let db = Database::open_in_memory().unwrap();
        let user = sign_up(&db, "  Lifter@Example.com ", "hunter22").unwrap();
        assert_eq!(user.email, "lifter@example.com");

        let (signed_in, token) = sign_in(&db, "LIFTER@example.com", "hunter22").unwrap();
        assert_eq!(signed_in.id, user.id);
        assert_eq!(token.len(), 64);

        let resolved = authenticate(&db, &token).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[test]
    fn test_password_stored_as_bcrypt_hash() {
        let db = Database::open_in_memory().unwrap();
        sign_up(&db, "a@example.com", "hunter22").unwrap();
        sign_up(&db, "b@example.com", "hunter22").unwrap();
        let a = db.get_credentials("a@example.com").unwrap().unwrap();
        let b = db.get_credentials("b@example.com").unwrap().unwrap();

        assert!(a.password_hash.starts_with("$2"), "{}", a.password_hash);
        assert!(!a.password_hash.contains("hunter22"));
        assert!(
            !(a.password_hash.len() == 64
                && a.password_hash.chars().all(|c| c.is_ascii_hexdigit()))
        );
        assert_ne!(a.password_hash, to_hex(&Sha256::digest(b"hunter22")));
        // Each hash carries its own salt
        assert_ne!(a.password_hash, b.password_hash);

        assert!(bcrypt::verify("hunter22", &a.password_hash).unwrap());
        assert!(!bcrypt::verify("hunter23", &a.password_hash).unwrap());
    }

    #[test]
    fn test_sign_in_with_unparseable_stored_hash() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user("legacy@example.com", "not-a-bcrypt-hash").unwrap();
        let err = sign_in(&db, "legacy@example.com", "anything").unwrap_err();
        assert_eq!(
            err.downcast_ref::<AuthError>(),
            Some(&AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_sign_up_validation() {
        let db = Database::open_in_memory().unwrap();
        let err = sign_up(&db, "not-an-email", "secret1").unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid email address");
        let err = sign_up(&db, "a@example.com", "12345").unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");

        sign_up(&db, "a@example.com", "123456").unwrap();
        let err = sign_up(&db, "A@EXAMPLE.COM", "123456").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_sign_in_rejects_bad_credentials() {
        let db = Database::open_in_memory().unwrap();
        sign_up(&db, "a@example.com", "secret1").unwrap();
        for (email, password) in [
            ("a@example.com", "wrong-password"),
            ("nobody@example.com", "secret1"),
            ("garbage", "secret1"),
        ] {
            let err = sign_in(&db, email, password).unwrap_err();
            assert_eq!(
                err.downcast_ref::<AuthError>(),
                Some(&AuthError::InvalidCredentials)
            );
            assert_eq!(err.to_string(), "Invalid login credentials");
        }
    }

    #[test]
    fn test_sign_out_revokes_token() {
        let db = Database::open_in_memory().unwrap();
        sign_up(&db, "a@example.com", "secret1").unwrap();
        let (_, token) = sign_in(&db, "a@example.com", "secret1").unwrap();
        let (_, other) = sign_in(&db, "a@example.com", "secret1").unwrap();
        assert_ne!(token, other);

        assert!(sign_out(&db, &token).unwrap());
        assert!(!sign_out(&db, &token).unwrap());
        assert!(authenticate(&db, &token).unwrap().is_none());
        assert!(authenticate(&db, &other).unwrap().is_some());
    }

    #[test]
    fn test_authenticate_unknown_token() {
        let db = Database::open_in_memory().unwrap();
        assert!(authenticate(&db, "").unwrap().is_none());
        assert!(authenticate(&db, "deadbeef").unwrap().is_none());
    }
}
