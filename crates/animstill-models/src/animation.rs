//! Animation kinds offered to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Motion applied to the still image.
///
/// Parsing never fails: names outside the supported set map to
/// [`AnimationKind::Static`], which renders a non-moving frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum AnimationKind {
    /// Pan from the left edge to the right edge
    LeftToRight,
    /// Pan from the right edge to the left edge
    RightToLeft,
    /// Pan from the top edge to the bottom edge
    TopToBottom,
    /// Pan from the bottom edge to the top edge
    BottomToTop,
    /// Zoom from 1.0x to 1.25x
    ZoomIn,
    /// Zoom from 1.25x to 1.0x
    ZoomOut,
    /// Horizontal pan across the central band
    PanHorizontal,
    /// Vertical pan across the central band
    PanVertical,
    /// Diagonal drift with a slow zoom
    Cinematic,
    /// No motion
    #[default]
    Static,
}

impl AnimationKind {
    /// All kinds with motion, in wire-name order.
    pub const ANIMATED: [AnimationKind; 9] = [
        AnimationKind::LeftToRight,
        AnimationKind::RightToLeft,
        AnimationKind::TopToBottom,
        AnimationKind::BottomToTop,
        AnimationKind::ZoomIn,
        AnimationKind::ZoomOut,
        AnimationKind::PanHorizontal,
        AnimationKind::PanVertical,
        AnimationKind::Cinematic,
    ];

    /// Wire name used by the web UI.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationKind::LeftToRight => "lr",
            AnimationKind::RightToLeft => "rl",
            AnimationKind::TopToBottom => "tb",
            AnimationKind::BottomToTop => "bt",
            AnimationKind::ZoomIn => "zoomIn",
            AnimationKind::ZoomOut => "zoomOut",
            AnimationKind::PanHorizontal => "panH",
            AnimationKind::PanVertical => "panV",
            AnimationKind::Cinematic => "cinematic",
            AnimationKind::Static => "static",
        }
    }

    /// Resolve a wire name, falling back to [`AnimationKind::Static`].
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "lr" => AnimationKind::LeftToRight,
            "rl" => AnimationKind::RightToLeft,
            "tb" => AnimationKind::TopToBottom,
            "bt" => AnimationKind::BottomToTop,
            "zoomIn" => AnimationKind::ZoomIn,
            "zoomOut" => AnimationKind::ZoomOut,
            "panH" => AnimationKind::PanHorizontal,
            "panV" => AnimationKind::PanVertical,
            "cinematic" => AnimationKind::Cinematic,
            _ => AnimationKind::Static,
        }
    }

    /// Whether the wire name is one of the supported kinds.
    pub fn is_known(name: &str) -> bool {
        name.trim() == "static" || Self::from_name(name) != AnimationKind::Static
    }
}

impl FromStr for AnimationKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<String> for AnimationKind {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

impl From<AnimationKind> for String {
    fn from(kind: AnimationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
