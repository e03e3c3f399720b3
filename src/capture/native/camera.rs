//! Default camera capture using nokhwa

use crate::capture::source::{TrackSettings, VideoFrame, VideoTrack};
use crate::capture::traits::{CameraConstraints, CaptureError, CaptureResult};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::{Camera, NokhwaError};
use tokio::sync::oneshot;

/// Consecutive failed reads after which the camera counts as unplugged
const MAX_FAILED_READS: u32 = 60;

fn map_open_error(error: NokhwaError) -> CaptureError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

fn open_device(constraints: &CameraConstraints) -> CaptureResult<Camera> {
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(constraints.ideal_width, constraints.ideal_height),
        FrameFormat::MJPEG,
        constraints.ideal_frame_rate,
    )));

    let mut camera = Camera::new(CameraIndex::Index(0), requested).map_err(map_open_error)?;
    camera.open_stream().map_err(map_open_error)?;
    Ok(camera)
}

/// Open the first camera at the format closest to the constraints
pub async fn open_camera(constraints: &CameraConstraints) -> CaptureResult<VideoTrack> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let constraints = constraints.clone();

    std::thread::spawn(move || {
        let mut camera = match open_device(&constraints) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let format = camera.camera_format();
        let track = VideoTrack::new(
            camera.info().human_name(),
            TrackSettings {
                width: Some(format.resolution().width()),
                height: Some(format.resolution().height()),
                frame_rate: Some(format.frame_rate() as f64),
            },
        );
        tracing::info!(
            "Camera opened: {}x{} @ {}fps (requested {}x{} @ {}fps)",
            format.resolution().width(),
            format.resolution().height(),
            format.frame_rate(),
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.ideal_frame_rate
        );
        if ready_tx.send(Ok(track.clone())).is_err() {
            let _ = camera.stop_stream();
            return;
        }

        let mut failed = 0u32;
        while track.is_live() {
            let frame = camera
                .frame()
                .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
            match frame {
                Ok(image) => {
                    failed = 0;
                    let (width, height) = (image.width(), image.height());
                    if let Some(frame) = VideoFrame::new(width, height, image.into_raw()) {
                        track.push_frame(frame);
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::debug!("Camera read failed: {}", e);
                    if failed >= MAX_FAILED_READS {
                        tracing::warn!("Camera stopped producing frames");
                        track.end_by_host();
                    }
                }
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
        tracing::info!("Camera stopped");
    });

    ready_rx
        .await
        .map_err(|_| CaptureError::DeviceUnavailable("Camera thread exited".to_string()))?
}
