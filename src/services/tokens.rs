// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token lifecycle.
//!
//! Access tokens are stateless: signature, type and expiry are all that is
//! checked. Refresh tokens are additionally bound to the single value stored
//! on the user document, so rotating (or logging out) revokes the previous
//! refresh token immediately.
//!
//! The read-compare-write in [`TokenService::rotate`] is not atomic. Two
//! concurrent rotations of the same still-valid token may both succeed; the
//! client whose write lands first ends up holding a token that is no longer
//! stored and has to log in again.

use crate::config::{Config, TokenConfig};
use crate::db::FirestoreDb;
use crate::models::User;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Discriminates access from refresh tokens inside the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub user_name: String,
    pub full_name: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

trait TypedClaims {
    fn token_type(&self) -> TokenType;
}

impl TypedClaims for AccessClaims {
    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

impl TypedClaims for RefreshClaims {
    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
}

/// Token lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token subject does not exist")]
    UnknownUser,

    #[error("Refresh token expired or used")]
    TokenReuseOrMismatch,

    #[error("Token generation failed: {0}")]
    GenerationFailure(String),

    #[error("Session store failure: {0}")]
    StoreFailure(String),
}

impl TokenError {
    /// Machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::InvalidToken => "invalid_token",
            TokenError::ExpiredToken => "expired_token",
            TokenError::UnknownUser => "unknown_user",
            TokenError::TokenReuseOrMismatch => "token_reused",
            TokenError::GenerationFailure(_) => "token_generation_failed",
            TokenError::StoreFailure(_) => "session_store_failed",
        }
    }

    /// True for failures of the signer or the store rather than of the
    /// presented credential.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            TokenError::GenerationFailure(_) | TokenError::StoreFailure(_)
        )
    }
}

/// Signing material for one token kind.
#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SigningKeys {
    fn new(config: &TokenConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&config.secret),
            decoding: DecodingKey::from_secret(&config.secret),
            ttl_secs: i64::try_from(config.ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::GenerationFailure(e.to_string()))
    }

    /// Verify signature, expiry and token type.
    fn verify<T>(&self, token: &str, expected: TokenType) -> Result<T, TokenError>
    where
        T: DeserializeOwned + TypedClaims,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<T>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
            _ => TokenError::InvalidToken,
        })?;

        if data.claims.token_type() != expected {
            return Err(TokenError::InvalidToken);
        }
        Ok(data.claims)
    }
}

/// Issues, validates, rotates and revokes session tokens.
#[derive(Clone)]
pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
    db: FirestoreDb,
}

impl TokenService {
    pub fn new(config: &Config, db: FirestoreDb) -> Self {
        Self {
            access: SigningKeys::new(&config.access_token),
            refresh: SigningKeys::new(&config.refresh_token),
            db,
        }
    }

    /// Mint a new pair for `user_id` and store its refresh half.
    ///
    /// The store write is the last step: on any failure nothing is returned
    /// and the previously stored refresh token is left as it was.
    pub async fn issue(&self, user_id: &str) -> Result<TokenPair, TokenError> {
        let user = self
            .db
            .get_user(user_id)
            .await
            .map_err(|e| TokenError::GenerationFailure(e.to_string()))?
            .ok_or(TokenError::UnknownUser)?;

        let pair = self.sign_pair(&user)?;

        self.db
            .set_refresh_token(&user.id, Some(&pair.refresh_token))
            .await
            .map_err(|e| TokenError::GenerationFailure(e.to_string()))?;

        tracing::debug!(user_id = %user.id, "Issued token pair");
        Ok(pair)
    }

    fn sign_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        let now = Utc::now().timestamp();
        let access_expires_at = now.saturating_add(self.access.ttl_secs);
        let refresh_expires_at = now.saturating_add(self.refresh.ttl_secs);

        let access_token = self.access.sign(&AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            user_name: user.user_name.clone(),
            full_name: user.full_name.clone(),
            token_type: TokenType::Access,
            iat: now,
            exp: access_expires_at,
            jti: uuid::Uuid::new_v4().to_string(),
        })?;

        let refresh_token = self.refresh.sign(&RefreshClaims {
            sub: user.id.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: refresh_expires_at,
            jti: uuid::Uuid::new_v4().to_string(),
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Decode an access token without touching the store.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.access.verify(token, TokenType::Access)
    }

    /// Validate an access token and return the user ID it was issued to.
    pub fn validate_access(&self, token: &str) -> Result<String, TokenError> {
        self.decode_access(token).map(|claims| claims.sub)
    }

    /// Exchange the presented refresh token for a new pair.
    ///
    /// Succeeds only if the token verifies and is exactly the one currently
    /// stored for its user; the stored token is replaced as part of issuing
    /// the new pair.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, TokenError> {
        let claims: RefreshClaims = self.refresh.verify(presented, TokenType::Refresh)?;

        let user = self
            .db
            .get_user(&claims.sub)
            .await
            .map_err(|e| TokenError::StoreFailure(e.to_string()))?
            .ok_or(TokenError::UnknownUser)?;

        let matches = user
            .refresh_token
            .as_deref()
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(presented.as_bytes())));

        if !matches {
            tracing::warn!(
                user_id = %user.id,
                jti = %claims.jti,
                "Rejected refresh token that is not the stored one (reuse or revoked)"
            );
            return Err(TokenError::TokenReuseOrMismatch);
        }

        self.issue(&user.id).await
    }

    /// Revoke the stored refresh token for `user_id` (logout).
    pub async fn invalidate(&self, user_id: &str) -> Result<(), TokenError> {
        self.db
            .set_refresh_token(user_id, None)
            .await
            .map_err(|e| TokenError::StoreFailure(e.to_string()))?;

        tracing::info!(user_id, "Session invalidated");
        Ok(())
    }
}
