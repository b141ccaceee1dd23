//! Configuration management for chatrelay
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Upstream OpenAI-compatible API base URL (e.g. "https://api.openai.com/v1")
    pub openai_api_url: String,
    /// Upstream API key (required)
    pub openai_api_key: String,
    /// Model identifier sent with every upstream request
    pub openai_model: String,

    /// Preset system prompt; the default assistant persona is used when unset or empty
    pub system_prompt: Option<String>,

    /// Public base URL used to build absolute upload URLs
    pub public_base_url: String,
    /// Directory where uploaded images are stored
    pub upload_dir: PathBuf,

    /// Upstream connect/response timeout (seconds)
    pub upstream_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let port: u16 = env::var("CHATRELAY_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .context("Invalid CHATRELAY_PORT")?;

        Ok(Self {
            host: env::var("CHATRELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,

            openai_api_url: env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            system_prompt: env::var("SYSTEM_PROMPT").ok(),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),

            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid UPSTREAM_TIMEOUT_SECS")?,
        })
    }
}
