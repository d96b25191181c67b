//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{download_render, get_progress, health, ready, submit_render};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_context, security_headers, SecurityPolicy};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Uploads are capped by RequestBodyLimitLayer below, not axum's 2MB default
    let render_routes = Router::new()
        .route("/render", post(submit_render))
        .layer(DefaultBodyLimit::disable());

    let job_routes = Router::new()
        .route("/progress/:id", get(get_progress))
        .route("/download/:id", get(download_render));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let timed_routes = Router::new()
        .merge(job_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout));

    Router::new()
        .merge(render_routes)
        .merge(timed_routes)
        .nest_service("/renders", ServeDir::new(&state.config.renders_dir))
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn_with_state(
            SecurityPolicy::for_config(&state.config),
            security_headers,
        ))
        .layer(middleware::from_fn(request_context))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
