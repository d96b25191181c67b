//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Request timeout for everything but submissions
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Web UI served at `/`
    pub static_dir: PathBuf,
    /// Rendered videos, served at `/renders`
    pub renders_dir: PathBuf,
    /// Raw uploads and cropped stills
    pub uploads_dir: PathBuf,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_size: 25 * 1024 * 1024, // 25MB
            environment: "development".to_string(),
            static_dir: PathBuf::from("static"),
            renders_dir: PathBuf::from("renders"),
            uploads_dir: PathBuf::from("/tmp/animstill"),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(25 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            renders_dir: std::env::var("RENDERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("renders")),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/animstill")),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        is_production_env(&self.environment)
    }
}

/// Whether an `ENVIRONMENT` value names production.
pub fn is_production_env(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_detection() {
        assert!(is_production_env("production"));
        assert!(is_production_env(" Production "));
        assert!(!is_production_env("development"));
        assert!(!is_production_env(""));

        let config = ApiConfig {
            environment: "PRODUCTION".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.is_production());
        assert!(!ApiConfig::default().is_production());
    }
}
