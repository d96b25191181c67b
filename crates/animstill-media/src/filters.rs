//! Motion filter definitions.
//!
//! Every animation kind maps to a [`MotionParams`] tuple: a horizontal and a
//! vertical [`Sweep`] plus a [`ZoomRamp`], all functions of normalized time
//! `u = frame / total_frames`. [`motion_filter`] is the single place where
//! those tuples become FFmpeg filter graphs.

use animstill_models::AnimationKind;

/// Oversize factor applied before cropping so that pans have room to move.
pub const PAN_OVERSCAN: f64 = 1.25;

/// Supersampling factor used before `zoompan` to reduce zoom jitter.
pub const ZOOM_SUPERSAMPLE: u32 = 2;

/// Window position along one axis, as a fraction of the available travel.
///
/// `0.0` is the left/top edge, `1.0` the right/bottom edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    pub from: f64,
    pub to: f64,
}

impl Sweep {
    /// Centered, no movement.
    pub const CENTER: Sweep = Sweep::new(0.5, 0.5);
    /// Full travel from the start edge to the end edge.
    pub const FORWARD: Sweep = Sweep::new(0.0, 1.0);
    /// Full travel from the end edge back to the start edge.
    pub const BACKWARD: Sweep = Sweep::new(1.0, 0.0);
    /// Travel across the 10–90% band.
    pub const BAND: Sweep = Sweep::new(0.1, 0.9);

    pub const fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn is_fixed(&self) -> bool {
        self.from == self.to
    }

    /// Position at normalized time `u`.
    pub fn at(&self, u: f64) -> f64 {
        self.from + (self.to - self.from) * u.clamp(0.0, 1.0)
    }

    fn expr(&self, u: &str) -> String {
        ramp_expr(self.from, self.to, u)
    }
}

/// Zoom factor over the clip, 1.0 meaning the full frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRamp {
    pub from: f64,
    pub to: f64,
}

impl ZoomRamp {
    /// Constant 1.0x zoom.
    pub const NONE: ZoomRamp = ZoomRamp::new(1.0, 1.0);

    pub const fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn is_none(&self) -> bool {
        self.from == 1.0 && self.to == 1.0
    }

    /// Zoom factor at normalized time `u`.
    pub fn at(&self, u: f64) -> f64 {
        self.from + (self.to - self.from) * u.clamp(0.0, 1.0)
    }

    fn expr(&self, u: &str) -> String {
        ramp_expr(self.from, self.to, u)
    }
}

/// Typed motion description for one animation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub horizontal: Sweep,
    pub vertical: Sweep,
    pub zoom: ZoomRamp,
}

impl MotionParams {
    /// A non-moving, full-frame shot.
    pub const STATIC: MotionParams = MotionParams {
        horizontal: Sweep::CENTER,
        vertical: Sweep::CENTER,
        zoom: ZoomRamp::NONE,
    };

    /// Motion parameters for an animation kind.
    pub fn for_kind(kind: AnimationKind) -> Self {
        let pan = |horizontal, vertical| MotionParams {
            horizontal,
            vertical,
            zoom: ZoomRamp::NONE,
        };
        let zoom = |ramp| MotionParams {
            zoom: ramp,
            ..MotionParams::STATIC
        };

        match kind {
            AnimationKind::LeftToRight => pan(Sweep::FORWARD, Sweep::CENTER),
            AnimationKind::RightToLeft => pan(Sweep::BACKWARD, Sweep::CENTER),
            AnimationKind::TopToBottom => pan(Sweep::CENTER, Sweep::FORWARD),
            AnimationKind::BottomToTop => pan(Sweep::CENTER, Sweep::BACKWARD),
            AnimationKind::ZoomIn => zoom(ZoomRamp::new(1.0, 1.25)),
            AnimationKind::ZoomOut => zoom(ZoomRamp::new(1.25, 1.0)),
            AnimationKind::PanHorizontal => pan(Sweep::BAND, Sweep::CENTER),
            AnimationKind::PanVertical => pan(Sweep::CENTER, Sweep::BAND),
            AnimationKind::Cinematic => MotionParams {
                horizontal: Sweep::FORWARD,
                vertical: Sweep::BACKWARD,
                zoom: ZoomRamp::new(1.0, 1.15),
            },
            AnimationKind::Static => MotionParams::STATIC,
        }
    }

    /// Whether the frame never moves.
    pub fn is_static(&self) -> bool {
        self.horizontal.is_fixed() && self.vertical.is_fixed() && self.zoom.is_none()
    }
}

/// Build the filter graph for a motion over `frames` output frames.
pub fn motion_filter(params: &MotionParams, width: u32, height: u32, fps: u32, frames: u32) -> String {
    let frames = frames.max(1);

    if params.is_static() {
        return format!("scale={}:{},setsar=1", width, height);
    }

    if params.zoom.is_none() {
        // Pure pan: oversize the still and slide a fixed-size crop window over it.
        let u = format!("min(n/{},1)", frames);
        return format!(
            "scale={}:{},crop={}:{}:x='(in_w-out_w)*({})':y='(in_h-out_h)*({})',setsar=1",
            even(width as f64 * PAN_OVERSCAN),
            even(height as f64 * PAN_OVERSCAN),
            width,
            height,
            params.horizontal.expr(&u),
            params.vertical.expr(&u),
        );
    }

    // Zoom: the window shrinks to iw/zoom, travel is what the zoom frees up.
    let u = format!("min(on/{},1)", frames);
    format!(
        "scale={}:{},zoompan=z='{}':x='(iw-iw/zoom)*({})':y='(ih-ih/zoom)*({})':d=1:s={}x{}:fps={},setsar=1",
        width * ZOOM_SUPERSAMPLE,
        height * ZOOM_SUPERSAMPLE,
        params.zoom.expr(&u),
        params.horizontal.expr(&u),
        params.vertical.expr(&u),
        width,
        height,
        fps,
    )
}

/// Linear ramp expression from `from` to `to` over `u`.
fn ramp_expr(from: f64, to: f64, u: &str) -> String {
    if from == to {
        return fmt_num(from);
    }
    format!("{}+({})*{}", fmt_num(from), fmt_num(to - from), u)
}

/// Compact decimal formatting for filter expressions.
fn fmt_num(value: f64) -> String {
    let s = format!("{:.4}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Round to the nearest even integer (encoders reject odd yuv420p sizes).
fn even(value: f64) -> u32 {
    ((value / 2.0).round() as u32) * 2
}
