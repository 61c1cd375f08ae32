use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Region of a frame in fractions of its width and height, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Slack for rounding in engine-reported coordinates.
const EDGE_SLACK: f64 = 1e-3;

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Middle half of the frame at full height, used when no speaker was found.
    pub fn centered() -> Self {
        Self::new(0.25, 0.0, 0.5, 1.0)
    }

    /// Non-empty and inside the frame.
    pub fn is_valid(&self) -> bool {
        let inside = |origin: f64, extent: f64| origin >= 0.0 && extent > 0.0 && origin + extent <= 1.0 + EDGE_SLACK;
        inside(self.x, self.width) && inside(self.y, self.height)
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}
