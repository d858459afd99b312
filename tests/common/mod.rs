// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use account_api::config::Config;
use account_api::db::FirestoreDb;
use account_api::models::User;
use account_api::routes::create_router;
use account_api::services::{password, MediaService, TokenService};
use account_api::AppState;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};
use std::sync::Arc;

pub const MULTIPART_BOUNDARY: &str = "----account-api-test-boundary";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app with in-memory storage and a mock media host.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.upload_dir = std::env::temp_dir().join(format!("account-api-{}", uuid::Uuid::new_v4()));

    let db = FirestoreDb::new_in_memory();
    let tokens = TokenService::new(&config, db.clone());

    let state = Arc::new(AppState {
        config,
        db,
        tokens,
        media: MediaService::new_mock(),
    });

    (create_router(state.clone()), state)
}

/// Insert a user directly into the store.
#[allow(dead_code)]
pub async fn seed_user(state: &AppState, user_name: &str, email: &str, plain_password: &str) -> User {
    let now = User::timestamp_now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        user_name: user_name.to_string(),
        email: email.to_string(),
        full_name: format!("{} Test", user_name),
        avatar: "https://res.cloudinary.com/mock/image/upload/seed.png".to_string(),
        cover_image: String::new(),
        password_hash: password::hash_password(plain_password).await.unwrap(),
        refresh_token: None,
        created_at: now.clone(),
        updated_at: now,
    };
    state.db.create_user(&user).await.unwrap();
    user
}

/// Build a JSON request.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A multipart part: `(name, Some(file_name), content)` for files,
/// `(name, None, value)` for text.
#[allow(dead_code)]
pub type Part<'a> = (&'a str, Option<&'a str>, &'a str);

/// Encode a multipart/form-data body.
#[allow(dead_code)]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        match file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// Build a multipart request, optionally carrying a bearer token.
#[allow(dead_code)]
pub fn multipart_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    parts: &[Part<'_>],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
    );
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

/// Collect all Set-Cookie header values.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Find the Set-Cookie header for `name`.
#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Value part of a Set-Cookie header (`name=value; ...`).
#[allow(dead_code)]
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Read the response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
