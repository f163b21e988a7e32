//! Recording controller
//!
//! Top-level coordinator for the capture pipeline. Owns the capture source
//! and one container writer per active session, wires frame delivery into
//! the writer, and exposes the start/pause/resume/stop lifecycle.

use crate::capture::traits::{CaptureSource, FrameSink};
use crate::error::{CaptureError, CaptureResult};
use crate::muxer::sink::SinkFactory;
use crate::muxer::{ContainerWriter, Mp4Sink, VideoCodec, WriterOptions, WriterStats};
use crate::recorder::state::{RecordingConfig, RecordingSession, RecordingState, RecordingSummary};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Depth of the video delivery channel. Frames beyond this are dropped
/// rather than blocking the capture callback.
const VIDEO_CHANNEL_DEPTH: usize = 8;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// Recording stopped
    Stopped,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Error occurred
    Error(String),
}

/// Everything owned for the lifetime of one session
struct ActiveRecording {
    session: RecordingSession,
    writer: Arc<ContainerWriter>,
    /// Serialized video delivery context
    consumer: tokio::task::JoinHandle<()>,
    /// Tells the consumer to drain and exit even if a source leaks a sink
    shutdown: tokio::sync::oneshot::Sender<()>,
    /// Our copy of the sink; dropped on stop so the channel can close
    sink: FrameSink,
}

/// Drives the recording state machine: Idle → Recording ⇄ Paused → Idle
pub struct RecordingController {
    /// Where frames come from
    source: Box<dyn CaptureSource>,

    /// Current recording state
    state: RecordingState,

    /// The active session, if any
    active: Option<ActiveRecording>,

    /// Creates the container backend for each session
    container_factory: SinkFactory,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    /// Controller writing MP4 files
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self::with_container_factory(source, Arc::new(Mp4Sink::open))
    }

    /// Controller with a custom container backend
    pub fn with_container_factory(source: Box<dyn CaptureSource>, factory: SinkFactory) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            source,
            state: RecordingState::Idle,
            active: None,
            container_factory: factory,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state != RecordingState::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.state == RecordingState::Paused
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// The active session, if a recording is in progress
    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Frame accounting for the active session
    pub fn stats(&self) -> Option<WriterStats> {
        self.active.as_ref().map(|a| a.writer.stats())
    }

    /// Emitted output duration of the active session in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.stats().map(|s| s.duration_ms).unwrap_or(0)
    }

    /// Start recording
    pub async fn start(&mut self, config: RecordingConfig) -> CaptureResult<()> {
        if self.state != RecordingState::Idle {
            return Err(CaptureError::AlreadyRecording);
        }

        let displays = self.source.displays().await?;
        if displays.is_empty() {
            tracing::warn!("no displays available, refusing to start");
            return Err(CaptureError::NoDisplayAvailable);
        }

        if !self.source.has_permission() {
            // Advisory: the attempt proceeds and may fail asynchronously.
            tracing::warn!("screen recording permission not granted, capture may fail");
        }

        tracing::info!("starting recording to {}", config.destination.display());

        let options = WriterOptions {
            capture_audio: config.capture_audio,
            codec: config.codec.unwrap_or_else(VideoCodec::detect),
            ..WriterOptions::default()
        };
        let writer = Arc::new(ContainerWriter::with_factory(
            &config.destination,
            options,
            self.container_factory.clone(),
        ));

        let (video_tx, mut video_rx) = mpsc::channel(VIDEO_CHANNEL_DEPTH);
        let sink = FrameSink::new(video_tx, writer.clone());

        // The single consumer task is the serialized delivery context; no
        // two frames of a session are ever muxed concurrently.
        let (shutdown, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let consumer = tokio::spawn({
            let writer = writer.clone();
            async move {
                loop {
                    tokio::select! {
                        maybe = video_rx.recv() => match maybe {
                            Some(frame) => writer.handle_video_frame(frame),
                            None => break,
                        },
                        _ = &mut shutdown_rx => {
                            // Refuse new frames but drain what is queued.
                            video_rx.close();
                            while let Some(frame) = video_rx.recv().await {
                                writer.handle_video_frame(frame);
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("video delivery channel closed");
            }
        });

        if let Err(e) = self.source.start_capture(sink.clone()).await {
            tracing::warn!("capture source failed to start: {e}");
            consumer.abort();
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            return Err(e);
        }

        let session = RecordingSession::new(&config);
        tracing::info!("recording started ({})", session.id);

        self.active = Some(ActiveRecording {
            session,
            writer,
            consumer,
            shutdown,
            sink,
        });
        self.state = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started);

        Ok(())
    }

    /// Pause recording
    pub fn pause(&mut self) -> CaptureResult<()> {
        if self.state != RecordingState::Recording {
            return Err(CaptureError::NotRecording);
        }

        if let Some(active) = &self.active {
            active.writer.pause();
        }
        self.state = RecordingState::Paused;
        let _ = self.event_tx.send(RecordingEvent::Paused);
        tracing::info!("recording paused");

        Ok(())
    }

    /// Resume recording
    pub fn resume(&mut self) -> CaptureResult<()> {
        if self.state != RecordingState::Paused {
            return Err(CaptureError::NotRecording);
        }

        if let Some(active) = &self.active {
            active.writer.resume();
        }
        self.state = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Resumed);
        tracing::info!("recording resumed");

        Ok(())
    }

    /// Stop recording and finalize the output file.
    ///
    /// The summary's destination is the output path; the caller must
    /// discard a zero-byte file rather than present it as a recording.
    pub async fn stop(&mut self) -> CaptureResult<RecordingSummary> {
        if self.state == RecordingState::Idle {
            return Err(CaptureError::NotRecording);
        }
        let active = match self.active.take() {
            Some(active) => active,
            None => return Err(CaptureError::NotRecording),
        };

        tracing::info!("stopping recording ({})", active.session.id);

        // Stop the source first so no new frames are produced, then let
        // the consumer drain whatever is already in flight.
        if let Err(e) = self.source.stop_capture().await {
            tracing::warn!("capture source stop failed: {e}");
        }
        drop(active.sink);
        let _ = active.shutdown.send(());
        let _ = active.consumer.await;

        let path = active.writer.finish().await;
        let stats = active.writer.stats();

        self.state = RecordingState::Idle;
        let _ = self.event_tx.send(RecordingEvent::Stopped);

        tracing::info!(
            "recording stopped: {} ({} video frames, {} audio frames, {}ms)",
            path.display(),
            stats.video_frames,
            stats.audio_frames,
            stats.duration_ms
        );

        Ok(RecordingSummary {
            destination: path,
            duration_ms: stats.duration_ms,
            video_frames: stats.video_frames,
            audio_frames: stats.audio_frames,
            video_dropped: stats.video_dropped,
            audio_dropped: stats.audio_dropped,
        })
    }
}

/// Delete `path` if it exists and is empty.
///
/// A session that never initialized its container leaves a zero-byte (or
/// absent) file; callers use this instead of presenting it as a recording.
/// Returns true when there is no file left at `path`.
pub fn discard_if_empty(path: &Path) -> std::io::Result<bool> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    if metadata.len() == 0 {
        std::fs::remove_file(path)?;
        tracing::info!("discarded empty recording at {}", path.display());
        return Ok(true);
    }
    Ok(false)
}
