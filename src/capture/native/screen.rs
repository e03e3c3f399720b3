//! Display capture driven by a polling thread

use crate::capture::source::{MediaSource, SourceKind, TrackSettings, VideoFrame, VideoTrack};
use crate::capture::traits::{CaptureError, CaptureResult, DisplayInfo, ScreenConstraints};
use crate::compositor::{Rect, Surface};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

#[cfg(target_os = "macos")]
use super::screen_macos as platform;
#[cfg(target_os = "windows")]
use super::screen_windows as platform;

/// Consecutive failed grabs after which the display counts as gone
const MAX_MISSED_FRAMES: u32 = 30;

const DESKTOP_SOURCE_PREFIX: &str = "screen:";

pub fn is_supported() -> bool {
    cfg!(any(target_os = "macos", target_os = "windows"))
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
pub fn list_displays() -> Vec<DisplayInfo> {
    platform::list_displays()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn list_displays() -> Vec<DisplayInfo> {
    Vec::new()
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
pub fn ensure_permission() -> CaptureResult<()> {
    platform::ensure_permission()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn ensure_permission() -> CaptureResult<()> {
    Err(CaptureError::Unsupported(
        "Screen capture is not available on this platform".to_string(),
    ))
}

/// Look up a display by its desktop source id (`7` or `screen:7`)
pub fn find_display(source_id: &str) -> CaptureResult<DisplayInfo> {
    let id: u32 = source_id
        .strip_prefix(DESKTOP_SOURCE_PREFIX)
        .unwrap_or(source_id)
        .parse()
        .ok()
        .ok_or_else(|| CaptureError::NoSourceFound(format!("Unknown source '{}'", source_id)))?;
    list_displays()
        .into_iter()
        .find(|d| d.id == id)
        .ok_or_else(|| CaptureError::NoSourceFound(format!("Display {} not found", id)))
}

/// Largest size within the limits that keeps the aspect ratio
pub fn fit_within(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
    let sx = max_width.map(|m| m as f64 / width.max(1) as f64).unwrap_or(1.0);
    let sy = max_height.map(|m| m as f64 / height.max(1) as f64).unwrap_or(1.0);
    let scale = sx.min(sy).min(1.0);
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

fn downscale(frame: VideoFrame, width: u32, height: u32) -> VideoFrame {
    if frame.width() == width && frame.height() == height {
        return frame;
    }
    let mut surface = Surface::new(width, height);
    surface.draw_frame(&frame, Rect::new(0, 0, width, height));
    surface.snapshot()
}

/// Start polling `display` into a new screen source
#[cfg(any(target_os = "macos", target_os = "windows"))]
pub async fn capture_display(display: DisplayInfo, constraints: &ScreenConstraints) -> CaptureResult<MediaSource> {
    let fps = constraints
        .max_frame_rate
        .or(constraints.ideal_frame_rate)
        .unwrap_or(30)
        .max(1);
    let (width, height) = fit_within(
        display.width,
        display.height,
        constraints.max_width,
        constraints.max_height,
    );

    let track = VideoTrack::new(
        display.name.clone(),
        TrackSettings {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(fps as f64),
        },
    );

    let (ready_tx, ready_rx) = oneshot::channel();
    let thread_track = track.clone();
    std::thread::spawn(move || {
        let mut grabber = match platform::DisplayGrabber::open(&display) {
            Ok(grabber) => {
                let _ = ready_tx.send(Ok(()));
                grabber
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let interval = Duration::from_secs_f64(1.0 / fps as f64);
        let mut missed = 0u32;
        let mut frames = 0u64;

        while thread_track.is_live() {
            let started = Instant::now();
            match grabber.grab() {
                Some(frame) => {
                    missed = 0;
                    frames += 1;
                    thread_track.push_frame(downscale(frame, width, height));
                }
                None => {
                    missed += 1;
                    if missed >= MAX_MISSED_FRAMES {
                        tracing::warn!("Display {} stopped producing frames", display.id);
                        thread_track.end_by_host();
                        break;
                    }
                }
            }
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        tracing::info!("Display capture stopped. Captured {} frames", frames);
    });

    ready_rx
        .await
        .map_err(|_| CaptureError::DeviceUnavailable("Display capture thread exited".to_string()))??;

    tracing::info!("Display capture started: {}x{} @ {}fps", width, height, fps);
    Ok(MediaSource::new(SourceKind::Screen, vec![track], Vec::new()))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub async fn capture_display(_display: DisplayInfo, _constraints: &ScreenConstraints) -> CaptureResult<MediaSource> {
    Err(CaptureError::Unsupported(
        "Screen capture is not available on this platform".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_keeps_aspect() {
        assert_eq!(fit_within(3840, 2160, Some(1920), Some(1080)), (1920, 1080));
        assert_eq!(fit_within(2880, 1800, Some(1920), Some(1080)), (1728, 1080));
        assert_eq!(fit_within(1280, 720, Some(1920), Some(1080)), (1280, 720));
        assert_eq!(fit_within(1280, 720, None, None), (1280, 720));
    }

    #[test]
    fn test_find_display_rejects_windows() {
        assert!(find_display("window:1").is_err());
    }

    #[test]
    fn test_downscale() {
        let frame = VideoFrame::solid(4, 4, [9, 9, 9, 255]);
        let small = downscale(frame, 2, 2);
        assert_eq!((small.width(), small.height()), (2, 2));
        assert_eq!(small.pixel(1, 1), Some([9, 9, 9, 255]));
    }
}
