//! API middleware.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response};
use axum::middleware::Next;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ApiConfig;

/// Header carrying the request id, both ways.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is kept.
const MAX_REQUEST_ID_LEN: usize = 64;

/// CORS for browsers uploading from another origin.
///
/// `*` allows any origin. No credentials are involved, so the wildcard is
/// safe to combine with explicit headers.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::RANGE])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::CONTENT_LENGTH,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Which optional security headers are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Send `Strict-Transport-Security`; only meaningful behind TLS
    pub strict_transport: bool,
}

impl SecurityPolicy {
    pub fn for_config(config: &ApiConfig) -> Self {
        Self {
            strict_transport: config.is_production(),
        }
    }
}

/// Security headers middleware.
pub async fn security_headers(
    State(policy): State<SecurityPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), geolocation=(), microphone=()"),
    );
    if policy.strict_transport {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000"),
        );
    }

    response
}

/// Request id, span and completion log for every request.
///
/// A well-formed `X-Request-ID` from the client is kept, anything else is
/// replaced by a fresh UUID. Handler logs inherit the id from the span.
pub async fn request_context(request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = accepted_request_id(request.headers().get(REQUEST_ID_HEADER))
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!("request", request_id = %request_id, method = %method, path = %path);
    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if response.status().is_server_error() {
            warn!(status, duration_ms, "Request failed");
        } else if is_quiet_path(&path) {
            debug!(status, duration_ms, "Request completed");
        } else {
            info!(status, duration_ms, "Request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

fn accepted_request_id(value: Option<&HeaderValue>) -> Option<String> {
    let id = value?.to_str().ok()?.trim();
    let well_formed = !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    well_formed.then(|| id.to_string())
}

/// Polled endpoints logged at debug level.
fn is_quiet_path(path: &str) -> bool {
    matches!(path, "/health" | "/healthz" | "/ready" | "/metrics") || path.starts_with("/progress/")
}
