// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing via bcrypt.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking thread pool.

use crate::error::AppError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("bcrypt task failed: {}", e)))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("bcrypt hash: {}", e)))
}

/// Verify a password against a stored bcrypt hash.
///
/// A malformed stored hash counts as a mismatch rather than an error.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("bcrypt task failed: {}", e)))?;

    match verified {
        Ok(ok) => Ok(ok),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("correct horse").await.unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash").await.unwrap());
    }
}
