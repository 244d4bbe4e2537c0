use argon2::{
    password_hash::{ rand_core::OsRng, SaltString },
    Argon2,
    PasswordHash,
    PasswordHasher,
    PasswordVerifier,
};
use log::error;

use super::AuthError;

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Uses argon2 to verify the password against a stored hash.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    let hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(err) => {
            error!("failed to parse password hash: {}", err);
            return false;
        }
    };

    Argon2::default().verify_password(password.as_bytes(), &hash).is_ok()
}

/// Runs [`hash_password`] on tokio's blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await.map_err(|e|
        AuthError::Hash(e.to_string())
    )?
}

/// Runs [`verify_password`] on tokio's blocking pool.
pub async fn verify_password_blocking(password_hash: String, password: String) -> bool {
    match tokio::task::spawn_blocking(move || verify_password(&password_hash, &password)).await {
        Ok(valid) => valid,
        Err(err) => {
            error!("password verification task failed: {}", err);
            false
        }
    }
}
