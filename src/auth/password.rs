//! Argon2id password hashing plus random credentials.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const TEMPORARY_PASSWORD_LENGTH: usize = 12;
const RESET_TOKEN_LENGTH: usize = 43;

/// Hash a plaintext password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch, `Err` only for malformed hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Checks a new password and its confirmation.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if password != confirmation {
        return Err("Passwords do not match".to_string());
    }
    Ok(())
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Password for invited users and admin resets.
pub fn temporary_password() -> String {
    random_alphanumeric(TEMPORARY_PASSWORD_LENGTH)
}

/// Returns `(token, sha256_hex)`; only the hash is stored.
pub fn reset_token() -> (String, String) {
    let token = random_alphanumeric(RESET_TOKEN_LENGTH);
    let hash = hash_token(&token);
    (token, hash)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn new_password_rules() {
        assert!(validate_new_password("short", "short").is_err());
        assert_eq!(
            validate_new_password("longenough", "different").unwrap_err(),
            "Passwords do not match"
        );
        assert!(validate_new_password("longenough", "longenough").is_ok());
    }

    #[test]
    fn generated_credentials() {
        let pw = temporary_password();
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));

        let (token, hash) = reset_token();
        assert_eq!(token.len(), 43);
        assert_eq!(hash, hash_token(&token));
        assert_eq!(hash.len(), 64);
    }
}
