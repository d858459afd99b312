// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Account API: user registration, login, and session tokens
//!
//! This crate provides the backend for user accounts: registration with
//! avatar upload, paired access/refresh tokens with rotation, and profile
//! management.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::{MediaService, TokenService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub tokens: TokenService,
    pub media: MediaService,
}
