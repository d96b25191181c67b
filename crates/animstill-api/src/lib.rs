//! Axum HTTP API server.
//!
//! This crate provides:
//! - Render submission, progress polling and downloads
//! - Static serving of the web UI and rendered videos
//! - Security headers, request ids and CORS
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
