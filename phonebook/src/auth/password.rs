//! Password and token hashing with Argon2id + server-side pepper.
//!
//! Hashing is CPU-bound, so the async wrappers move it onto the blocking pool.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::errors::{AuthError, AuthResult};

/// Argon2id hasher holding the server-side pepper.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(pepper: String) -> Self {
        Self { pepper }
    }

    /// Hash a secret synchronously.
    pub fn hash_blocking(&self, secret: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", secret, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Check a secret against a stored hash synchronously.
    ///
    /// A stored value that is not a PHC string (such as the OAuth sentinel)
    /// never verifies.
    pub fn verify_blocking(&self, secret: &str, hash: &str) -> bool {
        let peppered = format!("{}{}", secret, self.pepper);
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(peppered.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Hash a secret on the blocking pool.
    pub async fn hash(&self, secret: &str) -> AuthResult<String> {
        let hasher = self.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&secret))
            .await
            .map_err(|_| AuthError::HashingFailed)?
    }

    /// Verify a secret on the blocking pool.
    pub async fn verify(&self, secret: &str, hash: &str) -> AuthResult<bool> {
        let hasher = self.clone();
        let secret = secret.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify_blocking(&secret, &hash))
            .await
            .map_err(|_| AuthError::HashingFailed)
    }
}
