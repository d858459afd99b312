// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The configuration is built once at startup and handed to the services that
//! need it. Nothing below the router reads the environment directly.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Signing secret and lifetime for one kind of session token.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC secret (raw bytes)
    pub secret: Vec<u8>,
    /// How long an issued token stays valid
    pub ttl: Duration,
}

/// Cloudinary credentials for media uploads.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Browser origin allowed by CORS
    pub cors_origin: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Directory where multipart uploads are staged before going to Cloudinary
    pub upload_dir: PathBuf,

    // --- Secrets ---
    /// Access token secret + lifetime (short)
    pub access_token: TokenConfig,
    /// Refresh token secret + lifetime (long)
    pub refresh_token: TokenConfig,
    /// Media host credentials
    pub cloudinary: CloudinaryConfig,
}

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ACCESS_EXPIRY: &str = "15m";
const DEFAULT_REFRESH_EXPIRY: &str = "10d";

impl Config {
    /// Fixed configuration for tests.
    pub fn test_default() -> Self {
        Self {
            cors_origin: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: DEFAULT_PORT,
            upload_dir: env::temp_dir().join("account-api-uploads"),
            access_token: TokenConfig {
                secret: b"test_access_secret_32_bytes_min!".to_vec(),
                ttl: Duration::from_secs(15 * 60),
            },
            refresh_token: TokenConfig {
                secret: b"test_refresh_secret_32_bytes_mn!".to_vec(),
                ttl: Duration::from_secs(10 * 24 * 60 * 60),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: "test-cloud".to_string(),
                api_key: "test_api_key".to_string(),
                api_secret: "test_api_secret".to_string(),
            },
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public/temp")),

            access_token: TokenConfig {
                secret: required("ACCESS_TOKEN_SECRET")?.into_bytes(),
                ttl: expiry_var("ACCESS_TOKEN_EXPIRY", DEFAULT_ACCESS_EXPIRY)?,
            },
            refresh_token: TokenConfig {
                secret: required("REFRESH_TOKEN_SECRET")?.into_bytes(),
                ttl: expiry_var("REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_EXPIRY)?,
            },
            cloudinary: CloudinaryConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
            },
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn expiry_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_expiry(&raw).ok_or(ConfigError::Invalid(name, raw))
}

/// Parse a token lifetime such as `30s`, `15m`, `1h`, `10d` or a bare number
/// of seconds. Zero is rejected.
pub fn parse_expiry(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: u64 = digits.parse().ok()?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    match value.checked_mul(multiplier)? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expiry_units() {
        assert_eq!(parse_expiry("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_expiry("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_expiry("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_expiry("10d"), Some(Duration::from_secs(864_000)));
        assert_eq!(parse_expiry(" 120 "), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_expiry_rejects_garbage() {
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("0m"), None);
        assert_eq!(parse_expiry("1w"), None);
        assert_eq!(parse_expiry("m"), None);
        assert_eq!(parse_expiry("1.5h"), None);
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("ACCESS_TOKEN_SECRET", "access_secret");
        env::set_var("ACCESS_TOKEN_EXPIRY", "1h");
        env::set_var("REFRESH_TOKEN_SECRET", "refresh_secret");
        env::set_var("REFRESH_TOKEN_EXPIRY", "7d");
        env::set_var("CLOUDINARY_CLOUD_NAME", "demo");
        env::set_var("CLOUDINARY_API_KEY", "key");
        env::set_var("CLOUDINARY_API_SECRET", "secret");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.access_token.secret, b"access_secret");
        assert_eq!(config.access_token.ttl, Duration::from_secs(3600));
        assert_eq!(config.refresh_token.ttl, Duration::from_secs(7 * 86400));
        assert_eq!(config.cloudinary.cloud_name, "demo");
    }
}
