// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT compatibility tests.
//!
//! These tests decode issued tokens with plain jsonwebtoken so that changes
//! to the claim layout or algorithm are caught early.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

mod common;

/// Claims as seen by any HS256 consumer of an access token.
#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    email: String,
    user_name: String,
    full_name: String,
    typ: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Refresh tokens carry only the subject.
#[derive(Debug, Deserialize)]
struct RefreshClaims {
    sub: String,
    typ: String,
    exp: i64,
    #[serde(default)]
    email: Option<String>,
}

#[tokio::test]
async fn test_access_token_claims() {
    let (_, state) = common::create_test_app();
    let user = common::seed_user(&state, "alice", "alice@example.com", "pw").await;
    let pair = state.tokens.issue(&user.id).await.unwrap();

    let data = decode::<AccessClaims>(
        &pair.access_token,
        &DecodingKey::from_secret(&state.config.access_token.secret),
        &Validation::new(Algorithm::HS256),
    )
    .expect("access token should decode with the access secret");

    assert_eq!(data.header.alg, Algorithm::HS256);
    let claims = data.claims;
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.user_name, "alice");
    assert_eq!(claims.full_name, user.full_name);
    assert_eq!(claims.typ, "access");
    assert_eq!(claims.exp, pair.access_expires_at);
    assert_eq!(
        claims.exp - claims.iat,
        state.config.access_token.ttl.as_secs() as i64
    );
    assert!(!claims.jti.is_empty());
}

#[tokio::test]
async fn test_refresh_token_claims() {
    let (_, state) = common::create_test_app();
    let user = common::seed_user(&state, "alice", "alice@example.com", "pw").await;
    let pair = state.tokens.issue(&user.id).await.unwrap();

    let claims = decode::<RefreshClaims>(
        &pair.refresh_token,
        &DecodingKey::from_secret(&state.config.refresh_token.secret),
        &Validation::new(Algorithm::HS256),
    )
    .expect("refresh token should decode with the refresh secret")
    .claims;

    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.typ, "refresh");
    assert_eq!(claims.exp, pair.refresh_expires_at);
    assert!(claims.email.is_none());
}

#[tokio::test]
async fn test_secrets_are_not_interchangeable() {
    let (_, state) = common::create_test_app();
    let user = common::seed_user(&state, "alice", "alice@example.com", "pw").await;
    let pair = state.tokens.issue(&user.id).await.unwrap();

    let result = decode::<RefreshClaims>(
        &pair.refresh_token,
        &DecodingKey::from_secret(&state.config.access_token.secret),
        &Validation::new(Algorithm::HS256),
    );
    assert!(result.is_err());
}
