// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account API Server
//!
//! User registration, login and session token rotation backed by Firestore,
//! with profile images hosted on Cloudinary.

use account_api::{
    config::Config,
    db::FirestoreDb,
    services::{MediaService, TokenService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Account API");

    // Staging directory for multipart uploads
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tracing::info!(path = %config.upload_dir.display(), "Upload staging directory ready");

    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let tokens = TokenService::new(&config, db.clone());
    tracing::info!(
        access_ttl_secs = config.access_token.ttl.as_secs(),
        refresh_ttl_secs = config.refresh_token.ttl.as_secs(),
        "Token service initialized"
    );

    let media = MediaService::new(config.cloudinary.clone());
    tracing::info!(cloud = %config.cloudinary.cloud_name, "Media service initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        tokens,
        media,
    });

    // Build router
    let app = account_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("account_api=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
