//! chatrelay - streaming chat proxy for OpenAI-compatible backends
//!
//! This library provides the core functionality for the chatrelay server:
//! conversation transformation with multimodal image inlining, an upstream
//! connector with DNS-pinned TLS, a cancellable SSE relay, and the HTTP
//! surface the chat front-end talks to.

pub mod config;
pub mod error;
pub mod images;
pub mod registry;
pub mod routes;
pub mod streaming;
pub mod transform;
pub mod types;
pub mod upstream;

use std::sync::Arc;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
pub use crate::images::ImageInliner;
pub use crate::registry::{StreamHandle, StreamRegistry};
pub use crate::upstream::UpstreamClient;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
    pub inliner: ImageInliner,
    pub registry: Arc<StreamRegistry>,
}

impl AppState {
    /// Create a new application state. Ensures the upload directory exists.
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;

        Ok(Self {
            upstream: UpstreamClient::new(&config),
            inliner: ImageInliner::new(&config),
            registry: Arc::new(StreamRegistry::new()),
            config,
        })
    }
}
