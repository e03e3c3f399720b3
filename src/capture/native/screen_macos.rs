//! macOS display capture via CoreGraphics display images

use crate::capture::source::VideoFrame;
use crate::capture::traits::{CaptureError, CaptureResult, DisplayInfo};
use core_graphics::access::ScreenCaptureAccess;
use core_graphics::display::CGDisplay;

pub fn list_displays() -> Vec<DisplayInfo> {
    let display_ids = CGDisplay::active_displays().unwrap_or_default();

    display_ids
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let display = CGDisplay::new(id);
            let is_main = display.is_main();

            DisplayInfo {
                id,
                name: if is_main {
                    "Primary Display".to_string()
                } else {
                    format!("Display {}", index + 1)
                },
                width: display.pixels_wide() as u32,
                height: display.pixels_high() as u32,
                is_primary: is_main,
            }
        })
        .collect()
}

/// Screen Recording must be granted before any display image is readable.
/// A missing grant triggers the system prompt and is reported as denied.
pub fn ensure_permission() -> CaptureResult<()> {
    if ScreenCaptureAccess::preflight() {
        return Ok(());
    }
    if ScreenCaptureAccess::request() {
        return Ok(());
    }
    Err(CaptureError::PermissionDenied(
        "Screen Recording permission has not been granted".to_string(),
    ))
}

pub struct DisplayGrabber {
    display: CGDisplay,
}

impl DisplayGrabber {
    pub fn open(display: &DisplayInfo) -> CaptureResult<Self> {
        let active = CGDisplay::active_displays().unwrap_or_default();
        if !active.contains(&display.id) {
            return Err(CaptureError::NoSourceFound(format!(
                "Display {} is not active",
                display.id
            )));
        }
        Ok(Self {
            display: CGDisplay::new(display.id),
        })
    }

    /// `None` once the display is disconnected or capture is revoked
    pub fn grab(&mut self) -> Option<VideoFrame> {
        let image = self.display.image()?;
        let data = image.data();
        VideoFrame::from_bgra(
            image.width() as u32,
            image.height() as u32,
            image.bytes_per_row(),
            data.bytes(),
        )
    }
}
