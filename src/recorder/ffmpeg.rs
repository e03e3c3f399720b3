//! FFmpeg-backed WebM encoder
//!
//! Raw RGBA frames of the synthetic track are piped to ffmpeg's stdin at the
//! track's frame rate, the first audio track is streamed as f32le over a
//! loopback TCP socket, and the WebM stream comes back on stdout. A ticker
//! hands whatever stdout produced since the last tick to the sink as one
//! segment.

use super::encoder::{
    Encoder, EncoderEvent, EncoderFactory, EncoderOptions, EncoderSink, RecordingError,
    RecordingResult,
};
use crate::capture::{AudioChunk, AudioFormat, AudioTrack, MediaSource, VideoTrack};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};

const READ_CHUNK: usize = 64 * 1024;
const AUDIO_POLL: Duration = Duration::from_millis(10);
const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Video codecs available in a WebM container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebmCodec {
    Vp9,
    Vp8,
}

impl WebmCodec {
    /// Codec for a WebM mime type; `None` for anything else.
    /// Plain `video/webm` maps to VP8.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mut parts = mime_type.split(';').map(str::trim);
        let container = parts.next()?;
        if !container.eq_ignore_ascii_case("video/webm") {
            return None;
        }

        let codecs = parts
            .find_map(|p| p.strip_prefix("codecs="))
            .map(|c| c.trim_matches('"').to_ascii_lowercase());
        match codecs.as_deref() {
            None => Some(WebmCodec::Vp8),
            Some(c) if c.starts_with("vp9") || c.starts_with("vp09") => Some(WebmCodec::Vp9),
            Some(c) if c.starts_with("vp8") => Some(WebmCodec::Vp8),
            Some(_) => None,
        }
    }

    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            WebmCodec::Vp9 => "libvpx-vp9",
            WebmCodec::Vp8 => "libvpx",
        }
    }
}

/// Raw video fed over stdin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInput {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

/// Raw audio fed over the loopback socket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInput {
    pub format: AudioFormat,
    pub port: u16,
}

/// Build the ffmpeg command line for a live WebM encode to stdout
pub fn build_encoder_args(
    codec: WebmCodec,
    video: &VideoInput,
    audio: Option<&AudioInput>,
    crf: u8,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", video.width, video.height),
        "-r".to_string(),
        video.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(), // stdin for video frames (input 0)
    ];

    if let Some(audio) = audio {
        args.extend([
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            audio.format.sample_rate.to_string(),
            "-ac".to_string(),
            audio.format.channels.to_string(),
            "-i".to_string(),
            format!("tcp://127.0.0.1:{}", audio.port),
        ]);
    }

    args.extend(["-map".to_string(), "0:v".to_string()]);
    if audio.is_some() {
        args.extend(["-map".to_string(), "1:a".to_string()]);
    }

    match codec {
        WebmCodec::Vp9 => {
            args.extend([
                "-c:v".to_string(),
                codec.ffmpeg_encoder().to_string(),
                "-crf".to_string(),
                crf.min(63).to_string(),
                "-b:v".to_string(),
                "0".to_string(),
                "-row-mt".to_string(),
                "1".to_string(),
            ]);
        }
        WebmCodec::Vp8 => {
            // libvpx needs a bitrate ceiling for crf to take effect
            args.extend([
                "-c:v".to_string(),
                codec.ffmpeg_encoder().to_string(),
                "-crf".to_string(),
                crf.clamp(4, 63).to_string(),
                "-b:v".to_string(),
                "2M".to_string(),
            ]);
        }
    }
    args.extend([
        "-deadline".to_string(),
        "realtime".to_string(),
        "-cpu-used".to_string(),
        "8".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    if audio.is_some() {
        args.extend([
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
    }

    args.extend(["-f".to_string(), "webm".to_string(), "-".to_string()]);
    args
}

/// Creates ffmpeg encoders for WebM mime types
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg_path: String,
    available: bool,
}

impl FfmpegEncoderFactory {
    /// Runs `ffmpeg -version` once; construct outside the async runtime.
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        let ffmpeg_path = ffmpeg_path.into();
        let available = Command::new(&ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        tracing::debug!("ffmpeg at '{}' available: {}", ffmpeg_path, available);
        Self {
            ffmpeg_path,
            available,
        }
    }

    /// Whether the ffmpeg binary could be run when the factory was built
    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        WebmCodec::from_mime(mime_type).is_some()
    }

    fn create(
        &self,
        source: &MediaSource,
        options: &EncoderOptions,
        sink: EncoderSink,
    ) -> RecordingResult<Box<dyn Encoder>> {
        let codec = WebmCodec::from_mime(&options.mime_type).ok_or_else(|| {
            RecordingError::EncoderUnavailable(format!("unsupported type {}", options.mime_type))
        })?;

        if !self.is_available() {
            return Err(RecordingError::EncoderUnavailable(format!(
                "FFmpeg not found at '{}'. Please install FFmpeg",
                self.ffmpeg_path
            )));
        }

        let video = source
            .primary_video()
            .cloned()
            .ok_or_else(|| RecordingError::Encoding("source has no video track".to_string()))?;
        let settings = video.settings();
        let (Some(width), Some(height)) = (settings.width, settings.height) else {
            return Err(RecordingError::Encoding(
                "source video has no known dimensions".to_string(),
            ));
        };

        let audio = source
            .audio_tracks()
            .iter()
            .find_map(|track| track.format().map(|format| (track.clone(), format)));
        if audio.is_none() && !source.audio_tracks().is_empty() {
            tracing::warn!("Audio track format not known yet, recording video only");
        }

        Ok(Box::new(FfmpegWebmEncoder {
            ffmpeg_path: self.ffmpeg_path.clone(),
            mime_type: options.mime_type.clone(),
            codec,
            crf: options.crf,
            timeslice: options.timeslice,
            video,
            video_input: VideoInput {
                width,
                height,
                frame_rate: settings.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
            },
            audio,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(Vec::new())),
            stderr_log: Arc::new(Mutex::new(String::new())),
            frames_written: Arc::new(AtomicU64::new(0)),
            process: None,
            threads: Vec::new(),
            reader: None,
            ticker: None,
        }))
    }
}

/// A running ffmpeg process producing WebM
pub struct FfmpegWebmEncoder {
    ffmpeg_path: String,
    mime_type: String,
    codec: WebmCodec,
    crf: u8,
    timeslice: Duration,
    video: VideoTrack,
    video_input: VideoInput,
    audio: Option<(AudioTrack, AudioFormat)>,
    sink: EncoderSink,

    running: Arc<AtomicBool>,
    /// stdout bytes not yet handed out as a segment
    pending: Arc<Mutex<Vec<u8>>>,
    stderr_log: Arc<Mutex<String>>,
    frames_written: Arc<AtomicU64>,

    process: Option<Child>,
    /// Frame writer, audio writer, stderr drain
    threads: Vec<ThreadHandle<()>>,
    reader: Option<ThreadHandle<()>>,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

#[async_trait]
impl Encoder for FfmpegWebmEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.process.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let audio = match &self.audio {
            Some((track, format)) => {
                let listener = TcpListener::bind(("127.0.0.1", 0))?;
                let port = listener.local_addr()?.port();
                Some((listener, track.subscribe(), AudioInput { format: *format, port }))
            }
            None => None,
        };

        let args = build_encoder_args(
            self.codec,
            &self.video_input,
            audio.as_ref().map(|(_, _, input)| input),
            self.crf,
        );
        tracing::info!("Starting FFmpeg encoder: {:?}", args);

        let mut process = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecordingError::EncoderUnavailable(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| RecordingError::Encoding("Failed to capture FFmpeg stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| RecordingError::Encoding("Failed to capture FFmpeg stdout".to_string()))?;
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| RecordingError::Encoding("Failed to capture FFmpeg stderr".to_string()))?;

        self.running.store(true, Ordering::Release);

        self.threads.push(spawn_frame_writer(
            stdin,
            self.video.clone(),
            self.video_input,
            self.running.clone(),
            self.frames_written.clone(),
        ));
        if let Some((listener, samples, _)) = audio {
            self.threads
                .push(spawn_audio_writer(listener, samples, self.running.clone()));
        }
        let stderr_log = self.stderr_log.clone();
        self.threads.push(std::thread::spawn(move || {
            let mut log = String::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_string(&mut log);
            *stderr_log.lock() = log;
        }));

        let pending = self.pending.clone();
        self.reader = Some(std::thread::spawn(move || {
            let mut stdout = stdout;
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => pending.lock().extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Failed to read FFmpeg output: {}", e);
                        break;
                    }
                }
            }
        }));

        let pending = self.pending.clone();
        let sink = self.sink.clone();
        let timeslice = self.timeslice;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            loop {
                ticker.tick().await;
                let data = std::mem::take(&mut *pending.lock());
                if !data.is_empty() && sink.send(EncoderEvent::DataAvailable(data)).is_err() {
                    break;
                }
            }
        }));

        self.process = Some(process);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(process) = self.process.take() else {
            return Err(RecordingError::NotRecording);
        };
        self.running.store(false, Ordering::Release);

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            let _ = ticker.await;
        }

        let threads = std::mem::take(&mut self.threads);
        let reader = self.reader.take();
        let status = tokio::task::spawn_blocking(move || -> io::Result<ExitStatus> {
            let mut process = process;
            // The writers close stdin and the audio socket on exit, which lets ffmpeg finish
            for thread in threads {
                let _ = thread.join();
            }
            let status = process.wait()?;
            if let Some(reader) = reader {
                let _ = reader.join();
            }
            Ok(status)
        })
        .await
        .map_err(|e| RecordingError::Encoding(format!("FFmpeg finalizer failed: {}", e)))??;

        let tail = std::mem::take(&mut *self.pending.lock());
        if !tail.is_empty() {
            let _ = self.sink.send(EncoderEvent::DataAvailable(tail));
        }

        if !status.success() {
            let message = format!(
                "FFmpeg exited with status {}: {}",
                status,
                self.stderr_log.lock().trim()
            );
            tracing::warn!("{}", message);
            let _ = self.sink.send(EncoderEvent::Error(message));
        }

        tracing::info!(
            "FFmpeg encoder finished: {} frames written",
            self.frames_written.load(Ordering::Relaxed)
        );
        let _ = self.sink.send(EncoderEvent::Stopped);
        Ok(())
    }
}

impl Drop for FfmpegWebmEncoder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
        }
    }
}

/// Write the track's current frame every frame interval, paced by wall clock
fn spawn_frame_writer(
    mut stdin: ChildStdin,
    track: VideoTrack,
    input: VideoInput,
    running: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
) -> ThreadHandle<()> {
    std::thread::spawn(move || {
        let frame_interval = Duration::from_secs_f64(1.0 / input.frame_rate.max(1.0));
        let frame_size = input.width as usize * input.height as usize * 4;
        let blank = vec![0u8; frame_size];
        let started = Instant::now();
        let mut index: u32 = 0;

        while running.load(Ordering::Acquire) {
            let frame = track.current_frame();
            let data = match frame.as_deref() {
                Some(frame) if frame.data().len() == frame_size => frame.data(),
                _ => blank.as_slice(),
            };
            if let Err(e) = stdin.write_all(data) {
                tracing::warn!("FFmpeg stdin closed: {}", e);
                break;
            }
            written.fetch_add(1, Ordering::Relaxed);

            index = index.saturating_add(1);
            let next = started + frame_interval * index;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }
        // Dropping stdin signals EOF to ffmpeg
    })
}

/// Accept ffmpeg's audio connection and forward samples as f32le
fn spawn_audio_writer(
    listener: TcpListener,
    mut samples: broadcast::Receiver<Arc<AudioChunk>>,
    running: Arc<AtomicBool>,
) -> ThreadHandle<()> {
    std::thread::spawn(move || {
        let Some(mut stream) = accept_while_running(&listener, &running) else {
            return;
        };

        let mut bytes = Vec::new();
        while running.load(Ordering::Acquire) {
            match samples.try_recv() {
                Ok(chunk) => {
                    bytes.clear();
                    for sample in &chunk.samples {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    if let Err(e) = stream.write_all(&bytes) {
                        tracing::warn!("FFmpeg audio socket closed: {}", e);
                        break;
                    }
                }
                Err(TryRecvError::Empty) => std::thread::sleep(AUDIO_POLL),
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("Audio writer lagged, {} chunks dropped", n);
                }
                Err(TryRecvError::Closed) => break,
            }
        }
    })
}

fn accept_while_running(listener: &TcpListener, running: &AtomicBool) -> Option<TcpStream> {
    if let Err(e) = listener.set_nonblocking(true) {
        tracing::warn!("Failed to configure audio listener: {}", e);
        return None;
    }
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _)) => {
                return match stream.set_nonblocking(false) {
                    Ok(()) => Some(stream),
                    Err(e) => {
                        tracing::warn!("Failed to configure audio socket: {}", e);
                        None
                    }
                };
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(AUDIO_POLL),
            Err(e) => {
                tracing::warn!("Audio listener failed: {}", e);
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SourceKind, TrackSettings};
    use tokio::sync::mpsc;

    fn position(args: &[String], flag: &str, value: &str) -> Option<usize> {
        args.windows(2).position(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_codec_from_mime() {
        assert_eq!(WebmCodec::from_mime("video/webm;codecs=vp9"), Some(WebmCodec::Vp9));
        assert_eq!(WebmCodec::from_mime("video/webm; codecs=\"vp9,opus\""), Some(WebmCodec::Vp9));
        assert_eq!(WebmCodec::from_mime("video/webm;codecs=vp8"), Some(WebmCodec::Vp8));
        assert_eq!(WebmCodec::from_mime("video/webm"), Some(WebmCodec::Vp8));
        assert_eq!(WebmCodec::from_mime("video/webm;codecs=h264"), None);
        assert_eq!(WebmCodec::from_mime("video/mp4"), None);
    }

    #[test]
    fn test_vp9_args_with_audio() {
        let video = VideoInput {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
        };
        let audio = AudioInput {
            format: AudioFormat {
                sample_rate: 48_000,
                channels: 2,
            },
            port: 5000,
        };
        let args = build_encoder_args(WebmCodec::Vp9, &video, Some(&audio), 32);

        assert!(position(&args, "-s", "1920x1080").is_some());
        assert!(position(&args, "-r", "30").is_some());
        assert!(position(&args, "-i", "-").is_some());
        assert!(position(&args, "-i", "tcp://127.0.0.1:5000").is_some());
        assert!(position(&args, "-c:v", "libvpx-vp9").is_some());
        assert!(position(&args, "-crf", "32").is_some());
        assert!(position(&args, "-c:a", "libopus").is_some());
        assert!(position(&args, "-map", "1:a").is_some());
        // Output is the last thing on the line
        assert_eq!(&args[args.len() - 3..], &["-f", "webm", "-"]);
    }

    #[test]
    fn test_vp8_args_video_only() {
        let video = VideoInput {
            width: 640,
            height: 480,
            frame_rate: 30.0,
        };
        let args = build_encoder_args(WebmCodec::Vp8, &video, None, 0);

        assert!(position(&args, "-c:v", "libvpx").is_some());
        assert!(position(&args, "-crf", "4").is_some());
        assert!(position(&args, "-map", "1:a").is_none());
        assert!(!args.iter().any(|a| a == "libopus"));
    }

    #[test]
    fn test_missing_ffmpeg_is_unavailable() {
        let factory = FfmpegEncoderFactory::new("/nonexistent/ffmpeg-binary");
        assert!(factory.is_type_supported("video/webm;codecs=vp9"));
        assert!(!factory.is_available());

        let source = MediaSource::new(
            SourceKind::Synthetic,
            vec![VideoTrack::new(
                "composite",
                TrackSettings {
                    width: Some(64),
                    height: Some(48),
                    frame_rate: Some(30.0),
                },
            )],
            vec![],
        );
        let options = EncoderOptions {
            mime_type: "video/webm;codecs=vp9".to_string(),
            timeslice: Duration::from_secs(1),
            crf: 32,
        };
        // Every create reuses the cached result
        for _ in 0..2 {
            let (sink, _events) = mpsc::unbounded_channel();
            let err = factory.create(&source, &options, sink).err().unwrap();
            assert!(matches!(err, RecordingError::EncoderUnavailable(_)));
        }
    }
}
