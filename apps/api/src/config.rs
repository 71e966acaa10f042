use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::filter::BatchSettings;
use crate::llm_client::{DEFAULT_CHEAP_MODEL, DEFAULT_EXPENSIVE_MODEL};

/// Service configuration loaded from environment variables.
/// Only `DATABASE_URL` is required at startup; a missing API key or profile
/// surfaces later as a stage-level configuration error.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: Option<String>,
    pub profile_path: PathBuf,
    pub cheap_model: String,
    pub expensive_model: String,
    pub stage1_batch_size: usize,
    pub stage2_batch_size: usize,
    pub stage1_concurrency: usize,
    pub stage2_concurrency: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        let screening = BatchSettings::SCREENING_DEFAULT;
        let review = BatchSettings::REVIEW_DEFAULT;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            profile_path: std::env::var("PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("profile.json")),
            cheap_model: std::env::var("CHEAP_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHEAP_MODEL.to_string()),
            expensive_model: std::env::var("EXPENSIVE_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXPENSIVE_MODEL.to_string()),
            stage1_batch_size: parse_env("STAGE1_BATCH_SIZE", screening.batch_size)?,
            stage2_batch_size: parse_env("STAGE2_BATCH_SIZE", review.batch_size)?,
            stage1_concurrency: parse_env("STAGE1_CONCURRENCY", screening.concurrency)?,
            stage2_concurrency: parse_env("STAGE2_CONCURRENCY", review.concurrency)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
