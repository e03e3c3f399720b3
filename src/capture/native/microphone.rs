//! Default microphone capture using cpal

use crate::capture::source::{AudioChunk, AudioFormat, AudioTrack};
use crate::capture::traits::{CaptureError, CaptureResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::time::Duration;
use tokio::sync::oneshot;

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    track: AudioTrack,
    convert: fn(T) -> f32,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
{
    let format = AudioFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            track.push_samples(AudioChunk {
                format,
                samples: data.iter().map(|&s| convert(s)).collect(),
            });
        },
        |err| tracing::error!("Microphone stream error: {}", err),
        None,
    )
}

fn open_stream(track: AudioTrack) -> CaptureResult<(Stream, AudioFormat)> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("No microphone found".to_string()))?;

    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to get audio config: {}", e)))?;
    let sample_format = config.sample_format();
    let stream_config: StreamConfig = config.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, track, |s| s),
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, track, |s| s as f32 / i16::MAX as f32)
        }
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, track, |s| {
            (s as f32 / u16::MAX as f32) * 2.0 - 1.0
        }),
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "Unsupported microphone sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("Microphone is not available".to_string())
        }
        other => CaptureError::DeviceUnavailable(format!("Failed to build audio stream: {}", other)),
    })?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to start microphone: {}", e)))?;

    Ok((
        stream,
        AudioFormat {
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        },
    ))
}

/// Open the default input device. The stream lives on its own thread
/// (cpal streams are not `Send`) until the track ends.
pub async fn open_default_microphone() -> CaptureResult<AudioTrack> {
    let track = AudioTrack::new("Default Microphone", None);
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread_track = track.clone();
    std::thread::spawn(move || {
        let stream = match open_stream(thread_track.clone()) {
            Ok((stream, format)) => {
                tracing::info!(
                    "Microphone started: {} Hz, {} channels",
                    format.sample_rate,
                    format.channels
                );
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        while thread_track.is_live() {
            std::thread::sleep(Duration::from_millis(100));
        }
        drop(stream);
        tracing::info!("Microphone stopped");
    });

    ready_rx
        .await
        .map_err(|_| CaptureError::DeviceUnavailable("Microphone thread exited".to_string()))??;
    Ok(track)
}
