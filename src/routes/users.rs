// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account routes: registration, sessions and profile management.

use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::models::{User, UserProfile};
use crate::routes::upload::{MultipartForm, StagedFile};
use crate::routes::ApiResponse;
use crate::services::{password, MediaService, TokenPair, UploadedMedia};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use validator::Validate;

/// Public user routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/users/register", post(register))
        .route("/api/v1/users/login", post(login))
        .route("/api/v1/users/refresh-token", post(refresh_token))
}

/// User routes that require an access token.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/users/logout", post(logout))
        .route("/api/v1/users/change-password", post(change_password))
        .route("/api/v1/users/current-user", get(current_user))
        .route("/api/v1/users/update-account", patch(update_account))
        .route("/api/v1/users/avatar", patch(update_avatar))
        .route("/api/v1/users/cover-image", patch(update_cover_image))
}

// ─── Session Cookies ─────────────────────────────────────────

fn session_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs.max(0)))
        .build()
}

fn set_session_cookies(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    let now = chrono::Utc::now().timestamp();
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        pair.access_expires_at - now,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        pair.refresh_expires_at - now,
    ))
}

fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    // Sent even when the request carried no cookies (bearer auth)
    jar.add(session_cookie(ACCESS_COOKIE, String::new(), 0))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0))
}

/// Token pair as returned in response bodies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&TokenPair> for TokenData {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
        }
    }
}

// ─── Registration ────────────────────────────────────────────

#[derive(Debug, Validate)]
struct RegisterFields {
    #[validate(length(max = 100))]
    full_name: String,
    #[validate(email)]
    email: String,
    #[validate(length(max = 50))]
    user_name: String,
    #[validate(length(max = 128))]
    password: String,
}

/// Register a new user (multipart form with avatar and optional cover image).
async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = MultipartForm::read(multipart, &state.config.upload_dir).await?;

    let fields = RegisterFields {
        full_name: form.text("fullName"),
        email: form.text("email"),
        user_name: User::normalize_user_name(&form.text("userName")),
        password: form.text("password"),
    };

    if [
        &fields.full_name,
        &fields.email,
        &fields.user_name,
        &fields.password,
    ]
    .iter()
    .any(|f| f.is_empty())
    {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    fields.validate()?;

    if state
        .db
        .find_user_by_email_or_username(Some(&fields.email), Some(&fields.user_name))
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "User already exists with this email or username".to_string(),
        ));
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| AppError::BadRequest("Avatar file is required".to_string()))?;
    let cover_file = form.take_file("coverImage");

    let (avatar, cover_image) = upload_profile_images(
        &state.media,
        avatar_file.path(),
        cover_file.as_ref().map(StagedFile::path),
    )
    .await?;

    let now = User::timestamp_now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        user_name: fields.user_name,
        email: fields.email,
        full_name: fields.full_name,
        avatar: avatar.url,
        cover_image: cover_image.map(|c| c.url).unwrap_or_default(),
        password_hash: password::hash_password(&fields.password).await?,
        refresh_token: None,
        created_at: now.clone(),
        updated_at: now,
    };

    state.db.create_user(&user).await?;

    let created = state.db.get_user(&user.id).await?.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("User registration failed: {} not readable", user.id))
    })?;

    tracing::info!(user_id = %created.id, user_name = %created.user_name, "User registered");

    Ok(ApiResponse::new(
        StatusCode::CREATED,
        "User registered successfully",
        created.into(),
    ))
}

/// Upload the avatar and, if given, the cover image.
///
/// A failed cover upload leaves the already uploaded avatar on the media host;
/// its public ID is logged so it can be cleaned up.
async fn upload_profile_images(
    media: &MediaService,
    avatar: &Path,
    cover: Option<&Path>,
) -> Result<(UploadedMedia, Option<UploadedMedia>)> {
    let avatar = media.upload(avatar).await?;

    let Some(cover) = cover else {
        return Ok((avatar, None));
    };

    match media.upload(cover).await {
        Ok(cover) => Ok((avatar, Some(cover))),
        Err(e) => {
            tracing::warn!(
                public_id = %avatar.public_id,
                error = %e,
                "Cover image upload failed; avatar left orphaned"
            );
            Err(e)
        }
    }
}

// ─── Login / Logout ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

/// Log in with user name or email plus password.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginData>)> {
    let user_name = req.user_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let email = req.email.as_deref().map(str::trim).filter(|s| !s.is_empty());

    if user_name.is_none() && email.is_none() {
        return Err(AppError::BadRequest(
            "Username or email is required".to_string(),
        ));
    }

    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Password is required".to_string()))?;

    let user = state
        .db
        .find_user_by_email_or_username(email, user_name)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !password::verify_password(password, &user.password_hash).await? {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let pair = state.tokens.issue(&user.id).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    let data = LoginData {
        user: user.into(),
        access_token: pair.access_token.clone(),
        refresh_token: pair.refresh_token.clone(),
    };

    Ok((
        set_session_cookies(jar, &pair),
        ApiResponse::ok("User logged in successfully", data),
    ))
}

/// Log out: revoke the stored refresh token and clear both cookies.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<serde_json::Value>)> {
    state.tokens.invalidate(&user.user_id).await?;

    Ok((
        clear_session_cookies(jar),
        ApiResponse::ok("User logged out successfully", serde_json::json!({})),
    ))
}

// ─── Token Refresh ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchange a refresh token (cookie first, then JSON body) for a new pair.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenData>)> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let presented = match from_cookie {
        Some(token) => token,
        None => serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|req| req.refresh_token)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?,
    };

    let pair = state.tokens.rotate(&presented).await?;

    Ok((
        set_session_cookies(jar, &pair),
        ApiResponse::ok("Access token refreshed successfully", TokenData::from(&pair)),
    ))
}

// ─── Profile ─────────────────────────────────────────────────

async fn load_user(state: &AppState, user_id: &str) -> Result<User> {
    state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "New password is required"))]
    new_password: String,
}

/// Change the current user's password after checking the old one.
async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>> {
    req.validate()?;

    let mut user = load_user(&state, &auth.user_id).await?;

    if !password::verify_password(&req.old_password, &user.password_hash).await? {
        return Err(AppError::BadRequest("Old password is incorrect".to_string()));
    }

    user.password_hash = password::hash_password(&req.new_password).await?;
    user.updated_at = User::timestamp_now();
    state.db.update_profile(&user).await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(ApiResponse::ok(
        "Password changed successfully",
        serde_json::json!({}),
    ))
}

/// Get the current user's profile.
async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<UserProfile>> {
    let user = load_user(&state, &auth.user_id).await?;
    Ok(ApiResponse::ok(
        "Current user fetched successfully",
        user.into(),
    ))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountRequest {
    #[serde(default)]
    #[validate(length(max = 100))]
    full_name: String,
    #[serde(default)]
    #[validate(email)]
    email: String,
}

/// Update full name and email.
async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(mut req): Json<UpdateAccountRequest>,
) -> Result<ApiResponse<UserProfile>> {
    req.full_name = req.full_name.trim().to_string();
    req.email = req.email.trim().to_string();

    if req.full_name.is_empty() || req.email.is_empty() {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    req.validate()?;

    if let Some(owner) = state
        .db
        .find_user_by_email_or_username(Some(&req.email), None)
        .await?
    {
        if owner.id != auth.user_id {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }
    }

    let mut user = load_user(&state, &auth.user_id).await?;
    user.full_name = req.full_name;
    user.email = req.email;
    user.updated_at = User::timestamp_now();
    state.db.update_profile(&user).await?;

    Ok(ApiResponse::ok(
        "User details updated successfully",
        user.into(),
    ))
}

// ─── Images ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum ImageSlot {
    Avatar,
    CoverImage,
}

impl ImageSlot {
    fn field(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "coverImage",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "Avatar",
            ImageSlot::CoverImage => "Cover image",
        }
    }
}

async fn replace_image(
    state: &AppState,
    user_id: &str,
    multipart: Multipart,
    slot: ImageSlot,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = MultipartForm::read(multipart, &state.config.upload_dir).await?;
    let file = form
        .take_file(slot.field())
        .ok_or_else(|| AppError::BadRequest(format!("{} file is missing", slot.label())))?;

    let mut user = load_user(state, user_id).await?;
    let uploaded = state.media.upload(file.path()).await?;

    match slot {
        ImageSlot::Avatar => user.avatar = uploaded.url,
        ImageSlot::CoverImage => user.cover_image = uploaded.url,
    }
    user.updated_at = User::timestamp_now();
    state.db.update_profile(&user).await?;

    tracing::info!(user_id, slot = slot.field(), public_id = %uploaded.public_id, "Image replaced");

    Ok(ApiResponse::ok(
        format!("{} updated successfully", slot.label()),
        user.into(),
    ))
}

/// Replace the avatar image.
async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    replace_image(&state, &auth.user_id, multipart, ImageSlot::Avatar).await
}

/// Replace the cover image.
async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    replace_image(&state, &auth.user_id, multipart, ImageSlot::CoverImage).await
}
