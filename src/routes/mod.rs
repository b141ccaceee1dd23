//! HTTP routes for chatrelay
//!
//! This module defines all HTTP endpoints exposed by the proxy.

pub mod chat;
pub mod health;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // The browser front-end may be served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    // The upload route needs room for a full batch of image files
    let upload_routes = Router::new()
        .route("/upload", post(upload::upload_images))
        .layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_BODY_BYTES));

    Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/stop", post(chat::stop_chat))
        .route("/health", get(health::health_check))
        .merge(upload_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
