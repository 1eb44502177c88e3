//! Argon2 password hashing.
//!
//! Hashing is CPU-bound, so both operations run on tokio's blocking pool
//! instead of stalling a runtime worker.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::AuthError;

/// Hashes and verifies passwords with Argon2id.
#[derive(Debug, Clone)]
pub struct Passwords {
    params: Params,
}

impl Default for Passwords {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Passwords {
    /// Uses custom cost parameters. Tests pass a very cheap set.
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn hasher(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// Hashes `password` into a PHC string.
    ///
    /// # Errors
    /// Returns `AuthError::Password` if hashing fails or the blocking task
    /// is cancelled.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let params = self.params.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::hasher(params)
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Password(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Password(e.to_string()))?
    }

    /// Checks `password` against a stored PHC string. The cost parameters
    /// embedded in the hash are used, not `self`'s.
    ///
    /// # Errors
    /// Returns `AuthError::Password` if the stored hash is malformed.
    pub async fn verify(
        &self,
        password: &str,
        stored_hash: &str,
    ) -> Result<bool, AuthError> {
        let params = self.params.clone();
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored_hash)
                .map_err(|e| AuthError::Password(e.to_string()))?;
            Ok(Self::hasher(params)
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| AuthError::Password(e.to_string()))?
    }
}

/// A random 32-byte secret, hex encoded. Used as the password of anonymous
/// identities, which nobody ever types.
pub fn random_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
pub(crate) fn cheap() -> Passwords {
    Passwords::new(Params::new(8, 1, 1, None).expect("valid params"))
}
