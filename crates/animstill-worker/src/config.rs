//! Worker configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Encoder executable
    pub ffmpeg_path: PathBuf,
    /// Output frame rate
    pub fps: u32,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// How long finished jobs and their files are kept
    pub retention: Duration,
    /// Deadline for a single encoder run
    pub job_timeout: Duration,
    /// Public URL prefix of the renders directory
    pub renders_url_prefix: String,
    /// Progress reported as soon as a job starts running
    pub progress_floor: u8,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            fps: 30,
            width: 1280,
            height: 720,
            retention: Duration::from_secs(600), // 10 minutes
            job_timeout: Duration::from_secs(300),
            renders_url_prefix: "/renders".to_string(),
            progress_floor: 5,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            fps: std::env::var("RENDER_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|fps| *fps > 0)
                .unwrap_or(defaults.fps),
            width: std::env::var("RENDER_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(defaults.width),
            height: std::env::var("RENDER_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(defaults.height),
            retention: Duration::from_secs(
                std::env::var("RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            renders_url_prefix: std::env::var("RENDERS_URL_PREFIX")
                .unwrap_or(defaults.renders_url_prefix),
            progress_floor: defaults.progress_floor,
        }
    }

    /// Public location of a rendered file.
    pub fn result_url(&self, output_path: &Path) -> String {
        let file_name = output_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}/{}", self.renders_url_prefix.trim_end_matches('/'), file_name)
    }
}
