//! Picture-in-picture geometry

use serde::{Deserialize, Serialize};

/// Fraction of the surface's width and height the overlay may take
pub const OVERLAY_FRACTION: f64 = 0.2;

/// Overlay side length cap in pixels
pub const MAX_OVERLAY_SIZE: f64 = 200.0;

/// Gap between the overlay and the bottom-right corner
pub const OVERLAY_MARGIN: u32 = 20;

/// Border thickness drawn around the overlay
pub const BORDER_WIDTH: u32 = 3;

/// Axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Grow outwards by `amount` on every side
    pub fn inflate(&self, amount: u32) -> Self {
        Self {
            x: self.x - amount as i64,
            y: self.y - amount as i64,
            width: self.width + 2 * amount,
            height: self.height + 2 * amount,
        }
    }
}

/// Where the camera and its border go on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayLayout {
    /// Area the camera frame is scaled into
    pub camera: Rect,
    /// Outer edge of the border band surrounding `camera`
    pub border: Rect,
}

/// Side length of the square camera overlay: min(20% W, 20% H, 200)
pub fn overlay_size(surface_width: u32, surface_height: u32) -> u32 {
    (surface_width as f64 * OVERLAY_FRACTION)
        .min(surface_height as f64 * OVERLAY_FRACTION)
        .min(MAX_OVERLAY_SIZE)
        .floor() as u32
}

/// Overlay anchored bottom-right with the fixed margin
pub fn overlay_layout(surface_width: u32, surface_height: u32) -> OverlayLayout {
    let size = overlay_size(surface_width, surface_height);
    let x = surface_width as i64 - size as i64 - OVERLAY_MARGIN as i64;
    let y = surface_height as i64 - size as i64 - OVERLAY_MARGIN as i64;
    let camera = Rect::new(x, y, size, size);

    OverlayLayout {
        camera,
        border: camera.inflate(BORDER_WIDTH),
    }
}
