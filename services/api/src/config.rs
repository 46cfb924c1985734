//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{TimeDelta, Utc};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub data_dir: PathBuf,
    pub api_key: String,
    pub llm_api_base: String,
    pub embedding_api_base: String,
    pub embed_model: String,
    pub qa_model: String,
    pub session_timeout: TimeDelta,
    pub max_upload_bytes: usize,
    pub cors_allow_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_dir = PathBuf::from(var_or("DATA_DIR", "./data"));

        // --- Model Provider Settings ---
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENROUTER_API_KEY".to_string()))?;
        let llm_api_base = var_or("OPENAI_API_BASE", "https://openrouter.ai/api/v1");
        let embedding_api_base = var_or("EMBEDDING_API_BASE", "https://api.openai.com/v1");
        let embed_model = var_or("EMBED_MODEL", "text-embedding-3-small");
        let qa_model = var_or("QA_MODEL", "meta-llama/llama-3.2-1b-instruct");

        // --- Limits ---
        let session_timeout = session_timeout_from_hours(parse_positive(
            "SESSION_TIMEOUT_HOURS",
            &var_or("SESSION_TIMEOUT_HOURS", "8"),
        )?)?;
        let max_upload_bytes = parse_positive("MAX_UPLOAD_BYTES", &var_or("MAX_UPLOAD_BYTES", "52428800"))?;

        let cors_allow_origin = var_or("CORS_ALLOW_ORIGIN", "*");

        Ok(Self {
            bind_address,
            log_level,
            data_dir,
            api_key,
            llm_api_base,
            embedding_api_base,
            embed_model,
            qa_model,
            session_timeout,
            max_upload_bytes,
            cors_allow_origin,
        })
    }
}

/// Rejects lifetimes that cannot be added to the current time.
fn session_timeout_from_hours(hours: i64) -> Result<TimeDelta, ConfigError> {
    TimeDelta::try_hours(hours)
        .filter(|timeout| Utc::now().checked_add_signed(*timeout).is_some())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "SESSION_TIMEOUT_HOURS".to_string(),
                format!("{hours} hours is out of range"),
            )
        })
}

fn parse_positive<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue(var.to_string(), "must be greater than zero".to_string()));
    }
    Ok(parsed)
}
