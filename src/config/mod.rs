//! Configuration module for the SmartVault backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Default timeout for a single OCR request.
const DEFAULT_OCR_TIMEOUT_SECS: u64 = 60;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the OCR microservice; OCR is disabled when unset
    pub ocr_base_url: Option<String>,
    /// Per-request timeout for the OCR microservice
    pub ocr_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("SMARTVAULT_API_PSK").ok();

        let db_path = env::var("SMARTVAULT_DB_PATH")
            .unwrap_or_else(|_| "./data/smartvault.sqlite".to_string())
            .into();

        let bind_addr = env::var("SMARTVAULT_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid SMARTVAULT_BIND_ADDR: {}", e)))?;

        let log_level = env::var("SMARTVAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let ocr_base_url = env::var("SMARTVAULT_OCR_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let ocr_timeout = match env::var("SMARTVAULT_OCR_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                AppError::Internal(format!("Invalid SMARTVAULT_OCR_TIMEOUT_SECS: {}", e))
            })?,
            Err(_) => DEFAULT_OCR_TIMEOUT_SECS,
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            ocr_base_url,
            ocr_timeout: Duration::from_secs(ocr_timeout),
        })
    }
}
