// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed user operations.
//!
//! The same handle can also run against an in-process map, which is what the
//! test suite and offline development use. Both backends expose identical
//! semantics for the operations below.

use crate::db::collections;
use crate::error::AppError;
use crate::models::User;
use dashmap::DashMap;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Storage behind a [`FirestoreDb`] handle.
#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// In-process user documents.
#[derive(Default)]
struct MemoryStore {
    users: DashMap<String, User>,
    /// Reject refresh token writes (exercises store failures in tests)
    fail_session_writes: AtomicBool,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

/// Partial document used to write only the `refresh_token` field.
#[derive(Serialize, Deserialize)]
struct RefreshTokenPatch {
    refresh_token: Option<String>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator needs an unauthenticated connection.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create an in-process store (tests and offline development).
    ///
    /// Clones share the same data.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
        }
    }

    /// Make every later refresh token write on this in-memory store fail.
    #[cfg(test)]
    pub(crate) fn fail_session_writes(&self) {
        if let Backend::Memory(store) = &self.backend {
            store.fail_session_writes.store(true, Ordering::SeqCst);
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by account ID.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store.users.get(user_id).map(|u| u.value().clone())),
        }
    }

    /// Find the first user whose email or user name matches.
    ///
    /// The user name is normalized before comparison. Returns `None` when
    /// neither identifier is given.
    pub async fn find_user_by_email_or_username(
        &self,
        email: Option<&str>,
        user_name: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        let user_name = user_name
            .map(User::normalize_user_name)
            .filter(|u| !u.is_empty());

        if email.is_none() && user_name.is_none() {
            return Ok(None);
        }

        match &self.backend {
            Backend::Firestore(client) => {
                let users: Vec<User> = client
                    .fluent()
                    .select()
                    .from(collections::USERS)
                    .filter(move |q| {
                        q.for_any([
                            email
                                .clone()
                                .and_then(|email| q.field("email").eq(email)),
                            user_name
                                .clone()
                                .and_then(|user_name| q.field("user_name").eq(user_name)),
                        ])
                    })
                    .limit(1)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok(users.into_iter().next())
            }
            Backend::Memory(store) => Ok(store
                .users
                .iter()
                .find(|entry| {
                    let user = entry.value();
                    email.as_deref() == Some(user.email.as_str())
                        || user_name.as_deref() == Some(user.user_name.as_str())
                })
                .map(|entry| entry.value().clone())),
        }
    }

    /// Create a new user document. Fails if the ID is already taken.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .insert()
                    .into(collections::USERS)
                    .document_id(&user.id)
                    .object(user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            Backend::Memory(store) => match store.users.entry(user.id.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(AppError::Database(format!(
                        "User document {} already exists",
                        user.id
                    )))
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(user.clone());
                }
            },
        }

        tracing::debug!(user_id = %user.id, "User created");
        Ok(())
    }

    /// Write a user's profile and credential fields.
    ///
    /// `refresh_token` is left untouched so a profile edit can never revive
    /// or clobber a session; use [`FirestoreDb::set_refresh_token`] for that.
    pub async fn update_profile(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .fields(firestore::paths!(User::{
                        user_name,
                        email,
                        full_name,
                        avatar,
                        cover_image,
                        password_hash,
                        updated_at
                    }))
                    .in_col(collections::USERS)
                    .precondition(FirestoreWritePrecondition::Exists(true))
                    .document_id(&user.id)
                    .object(user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            Backend::Memory(store) => {
                let mut stored = store.users.get_mut(&user.id).ok_or_else(|| {
                    AppError::Database(format!("User document {} does not exist", user.id))
                })?;
                let refresh_token = stored.refresh_token.take();
                *stored = User {
                    refresh_token,
                    ..user.clone()
                };
            }
        }
        Ok(())
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Overwrite (or clear, with `None`) the stored refresh token.
    ///
    /// Only the `refresh_token` field is written so concurrent profile edits
    /// are not clobbered. This is a plain write, not a compare-and-set.
    /// Fails if the user document does not exist.
    pub async fn set_refresh_token(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .fields(firestore::paths!(RefreshTokenPatch::{ refresh_token }))
                    .in_col(collections::USERS)
                    .precondition(FirestoreWritePrecondition::Exists(true))
                    .document_id(user_id)
                    .object(&RefreshTokenPatch {
                        refresh_token: refresh_token.map(str::to_string),
                    })
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            Backend::Memory(store) => {
                if store.fail_session_writes.load(Ordering::SeqCst) {
                    return Err(AppError::Database(format!(
                        "Refresh token write rejected for {}",
                        user_id
                    )));
                }
                let mut user = store.users.get_mut(user_id).ok_or_else(|| {
                    AppError::Database(format!("User document {} does not exist", user_id))
                })?;
                user.refresh_token = refresh_token.map(str::to_string);
            }
        }

        tracing::debug!(
            user_id,
            cleared = refresh_token.is_none(),
            "Refresh token updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str, user_name: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            user_name: user_name.to_string(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            avatar: "https://example.com/a.png".to_string(),
            cover_image: String::new(),
            password_hash: "hash".to_string(),
            refresh_token: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_create_and_get() {
        let db = FirestoreDb::new_in_memory();
        db.create_user(&test_user("u1", "alice", "alice@example.com"))
            .await
            .unwrap();

        let fetched = db.get_user("u1").await.unwrap().expect("user exists");
        assert_eq!(fetched.user_name, "alice");
        assert!(db.get_user("missing").await.unwrap().is_none());

        // Duplicate IDs are rejected
        assert!(db
            .create_user(&test_user("u1", "other", "other@example.com"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_find_by_email_or_username() {
        let db = FirestoreDb::new_in_memory();
        db.create_user(&test_user("u1", "alice", "alice@example.com"))
            .await
            .unwrap();

        let by_name = db
            .find_user_by_email_or_username(None, Some("  ALICE "))
            .await
            .unwrap();
        assert_eq!(by_name.map(|u| u.id), Some("u1".to_string()));

        let by_email = db
            .find_user_by_email_or_username(Some("alice@example.com"), Some("nobody"))
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some("u1".to_string()));

        assert!(db
            .find_user_by_email_or_username(None, None)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .find_user_by_email_or_username(Some("bob@example.com"), Some("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_refresh_token_roundtrip() {
        let db = FirestoreDb::new_in_memory();
        db.create_user(&test_user("u1", "alice", "alice@example.com"))
            .await
            .unwrap();

        db.set_refresh_token("u1", Some("token-1")).await.unwrap();
        let user = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("token-1"));

        db.set_refresh_token("u1", None).await.unwrap();
        let user = db.get_user("u1").await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());

        assert!(db.set_refresh_token("missing", Some("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_profile_requires_existing_user() {
        let db = FirestoreDb::new_in_memory();
        let ghost = test_user("ghost", "ghost", "ghost@example.com");

        assert!(db.update_profile(&ghost).await.is_err());
        assert!(db.get_user("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_keeps_refresh_token() {
        let db = FirestoreDb::new_in_memory();
        let mut user = test_user("u1", "alice", "alice@example.com");
        db.create_user(&user).await.unwrap();
        db.set_refresh_token("u1", Some("live-token")).await.unwrap();

        // A stale copy without the token must not clear the session
        user.full_name = "Alice Liddell".to_string();
        user.refresh_token = None;
        db.update_profile(&user).await.unwrap();

        let stored = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.full_name, "Alice Liddell");
        assert_eq!(stored.refresh_token.as_deref(), Some("live-token"));
    }
}
