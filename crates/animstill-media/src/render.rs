//! Render command policy: clip length, frame count and the encoder
//! invocation for one animated still.

use std::path::Path;

use animstill_models::{AnimationKind, MAX_SPEED, MIN_SPEED};

use crate::command::FfmpegCommand;
use crate::filters::{motion_filter, MotionParams};

/// Clip length at speed 1.0.
pub const BASE_DURATION_SECS: f64 = 6.0;

/// Shortest clip the policy produces.
pub const MIN_DURATION_SECS: f64 = 2.0;

/// Output codec.
pub const VIDEO_CODEC: &str = "libx264";

/// Output pixel format.
pub const PIXEL_FORMAT: &str = "yuv420p";

/// Clip duration for a speed multiplier: `max(2.0, 6.0 / speed)`.
///
/// Non-positive or non-finite speeds fall back to speed 1.0; others are
/// clamped to the accepted speed range.
pub fn duration_for_speed(speed: f64) -> f64 {
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    let speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    (BASE_DURATION_SECS / speed).max(MIN_DURATION_SECS)
}

/// Number of output frames for a clip.
pub fn frame_count(fps: u32, duration_secs: f64) -> u32 {
    (fps as f64 * duration_secs).round() as u32
}

/// Everything needed to render one clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSpec {
    pub animation: AnimationKind,
    pub duration_secs: f64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl RenderSpec {
    pub fn new(animation: AnimationKind, duration_secs: f64, fps: u32, width: u32, height: u32) -> Self {
        Self {
            animation,
            duration_secs,
            fps,
            width,
            height,
        }
    }

    /// Render settings for a speed multiplier at the given output format.
    pub fn for_speed(animation: AnimationKind, speed: f64, fps: u32, width: u32, height: u32) -> Self {
        Self::new(animation, duration_for_speed(speed), fps, width, height)
    }

    pub fn frames(&self) -> u32 {
        frame_count(self.fps, self.duration_secs)
    }

    /// Filter graph for this clip.
    pub fn filter(&self) -> String {
        let params = MotionParams::for_kind(self.animation);
        motion_filter(&params, self.width, self.height, self.fps, self.frames())
    }
}

/// Build the encoder command that turns `input` into an animated clip at
/// `output`.
pub fn build_render_command(spec: &RenderSpec, input: impl AsRef<Path>, output: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .loop_input()
        .input_framerate(spec.fps)
        .video_filter(spec.filter())
        .duration(spec.duration_secs)
        .frames(spec.frames())
        .output_rate(spec.fps)
        .video_codec(VIDEO_CODEC)
        .pixel_format(PIXEL_FORMAT)
        .faststart()
}
