//! FFmpeg CLI wrapper for animating still images.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Motion filters for every animation kind
//! - Progress estimation from encoder output
//! - Cancellation and deadlines via tokio
//! - The 16:9 crop applied to uploads

pub mod command;
pub mod crop;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod progress;
pub mod render;

pub use command::{check_encoder, FfmpegCommand, FfmpegRunner};
pub use crop::{crop_to_widescreen, widescreen_dimensions, CropOutcome};
pub use error::{MediaError, MediaResult};
pub use filters::{motion_filter, MotionParams, Sweep, ZoomRamp};
pub use fs_utils::{ensure_dir, remove_file_if_exists, remove_files, sweep_dir};
pub use progress::ProgressEstimator;
pub use render::{build_render_command, duration_for_speed, frame_count, RenderSpec};
