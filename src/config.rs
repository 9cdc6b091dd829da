//! Configuration management.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Required. API key for the chat-completion endpoint.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `OPENAI_MODEL` - Optional. Defaults to `gpt-4o-mini`.
//! - `LLM_RESPONSE_MODE` - Optional. `json` or `function`. Defaults to `json`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `LOG_PATH` - Optional. Directory for activity logs and analytics. Defaults to `./logs`.
//! - `ANALYTICS_BACKEND` - Optional. `memory`, `file` or `sqlite`. Defaults to `file`.
//! - `CHUNK_THRESHOLD` - Optional. Largest plan generated in one call. Defaults to `12`.
//! - `CHUNK_BATCH_SIZE` - Optional. Units per batch. Defaults to `8`.
//! - `CHUNK_DELAY_MS` - Optional. Pause between batches. Defaults to `1000`.
//! - `MAX_WEEKS` - Optional. Longest plan accepted. Defaults to `52`.
//! - `MIN_PARTIAL_UNITS` - Optional. Smallest short plan accepted as partial. Defaults to `4`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::analytics::StoreType;
use crate::generator::GenerationConfig;
use crate::llm::ResponseMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub response_mode: ResponseMode,
    pub host: String,
    pub port: u16,
    pub log_path: PathBuf,
    pub analytics_backend: StoreType,
    pub generation: GenerationConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` is not set, and
    /// `ConfigError::InvalidValue` for any numeric setting that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let base_url =
            lookup("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let model = lookup("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let response_mode = match lookup("LLM_RESPONSE_MODE") {
            Some(v) => v
                .parse()
                .map_err(|e| ConfigError::InvalidValue("LLM_RESPONSE_MODE".to_string(), e))?,
            None => ResponseMode::default(),
        };

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_var(&lookup, "PORT", 3000)?;

        let log_path = lookup("LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./logs"));

        let analytics_backend = lookup("ANALYTICS_BACKEND")
            .map(|v| StoreType::from_str(&v))
            .unwrap_or_default();

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            chunk_threshold: parse_var(&lookup, "CHUNK_THRESHOLD", defaults.chunk_threshold)?,
            batch_size: parse_var(&lookup, "CHUNK_BATCH_SIZE", defaults.batch_size)?,
            batch_delay: Duration::from_millis(parse_var(
                &lookup,
                "CHUNK_DELAY_MS",
                defaults.batch_delay.as_millis() as u64,
            )?),
            max_weeks: parse_var(&lookup, "MAX_WEEKS", defaults.max_weeks)?,
            min_partial_units: parse_var(&lookup, "MIN_PARTIAL_UNITS", defaults.min_partial_units)?,
        };
        if generation.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_BATCH_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            base_url,
            model,
            response_mode,
            host,
            port,
            log_path,
            analytics_backend,
            generation,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
