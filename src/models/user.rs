//! User model for storage and API.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// User account stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque account ID (also used as document ID)
    pub id: String,
    /// Login handle, always stored lower-case
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    /// Hosted avatar URL
    pub avatar: String,
    /// Hosted cover image URL, empty when the user has none
    #[serde(default)]
    pub cover_image: String,
    /// bcrypt hash; never leaves the server
    pub password_hash: String,
    /// The one refresh token currently accepted for this user
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Normalize a user name for storage and lookup.
    pub fn normalize_user_name(user_name: &str) -> String {
        user_name.trim().to_lowercase()
    }

    /// Current time in the format used for `created_at` / `updated_at`.
    pub fn timestamp_now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Public view of a user: no credential hash, no refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
