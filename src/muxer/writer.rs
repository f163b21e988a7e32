//! Container writer
//!
//! Owns one output container per recording session. The container is
//! created lazily on the first video frame with usable geometry, samples
//! are appended with pause-reconciled timestamps, and `finish` produces a
//! file even when the session degenerated (zero frames, writer failure).
//!
//! Video frames must arrive on a single delivery context; audio frames may
//! arrive from any thread. The mux lock serializes both paths, and the
//! staging lock is the one synchronization point between audio arrival and
//! the flush triggered by the first written video frame.

use crate::capture::frame::{AudioFrame, VideoFrame};
use crate::muxer::mp4::Mp4Sink;
use crate::muxer::sink::{ContainerSink, MediaSample, SinkFactory, SinkSpec, VideoCodec};
use crate::muxer::staging::{AudioStagingQueue, DEFAULT_STAGING_CAP};
use crate::muxer::timebase::TimebaseReconciler;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Writer configuration fixed at session creation
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Whether the container gets an audio track
    pub capture_audio: bool,

    /// Video track codec
    pub codec: VideoCodec,

    /// Cap on audio frames staged before video starts
    pub staging_cap: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            capture_audio: false,
            codec: VideoCodec::detect(),
            staging_cap: DEFAULT_STAGING_CAP,
        }
    }
}

/// Externally visible container lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPhase {
    Uninitialized,
    Writing,
    Finished,
    Failed,
}

/// Frame accounting for a session.
///
/// `video_dropped`/`audio_dropped` count backpressure, ordering, and
/// failure drops; `video_paused`/`audio_paused` count frames skipped while
/// paused, which is the pause doing its job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub video_dropped: u64,
    pub audio_dropped: u64,
    pub video_paused: u64,
    pub audio_paused: u64,
    pub staged_audio_dropped: u64,
    pub duration_ms: u64,
}

/// Container lifecycle: the sink only exists while writing.
enum ContainerState {
    Uninitialized,
    Writing(Box<dyn ContainerSink>),
    Finished,
    Failed,
}

impl ContainerState {
    fn phase(&self) -> ContainerPhase {
        match self {
            ContainerState::Uninitialized => ContainerPhase::Uninitialized,
            ContainerState::Writing(_) => ContainerPhase::Writing,
            ContainerState::Finished => ContainerPhase::Finished,
            ContainerState::Failed => ContainerPhase::Failed,
        }
    }
}

/// Everything the serialized mux path mutates
struct MuxState {
    container: ContainerState,
    timebase: TimebaseReconciler,
    /// Adjusted time of the first observed video frame; output time zero
    epoch: Option<Duration>,
    /// Last emitted media timestamps, per track
    last_video_pts: Option<Duration>,
    last_audio_pts: Option<Duration>,
    /// End of the last written video sample, for duration reporting
    emitted_end: Duration,
    video_frames: u64,
    audio_frames: u64,
    video_dropped: u64,
    audio_dropped: u64,
    video_paused: u64,
    audio_paused: u64,
}

/// Writes one recording session to one container file
pub struct ContainerWriter {
    destination: PathBuf,
    options: WriterOptions,
    factory: SinkFactory,
    mux: Mutex<MuxState>,
    staging: Mutex<AudioStagingQueue>,
}

impl ContainerWriter {
    /// Writer backed by the MP4 sink
    pub fn new(destination: impl Into<PathBuf>, options: WriterOptions) -> Self {
        Self::with_factory(destination, options, Arc::new(Mp4Sink::open))
    }

    /// Writer with a custom container backend
    pub fn with_factory(
        destination: impl Into<PathBuf>,
        options: WriterOptions,
        factory: SinkFactory,
    ) -> Self {
        let staging_cap = options.staging_cap;
        Self {
            destination: destination.into(),
            options,
            factory,
            mux: Mutex::new(MuxState {
                container: ContainerState::Uninitialized,
                timebase: TimebaseReconciler::new(),
                epoch: None,
                last_video_pts: None,
                last_audio_pts: None,
                emitted_end: Duration::ZERO,
                video_frames: 0,
                audio_frames: 0,
                video_dropped: 0,
                audio_dropped: 0,
                video_paused: 0,
                audio_paused: 0,
            }),
            staging: Mutex::new(AudioStagingQueue::new(staging_cap)),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn phase(&self) -> ContainerPhase {
        self.mux.lock().container.phase()
    }

    pub fn is_paused(&self) -> bool {
        self.mux.lock().timebase.is_paused()
    }

    pub fn stats(&self) -> WriterStats {
        let mux = self.mux.lock();
        let staged_audio_dropped = self.staging.lock().dropped();
        WriterStats {
            video_frames: mux.video_frames,
            audio_frames: mux.audio_frames,
            video_dropped: mux.video_dropped,
            audio_dropped: mux.audio_dropped,
            video_paused: mux.video_paused,
            audio_paused: mux.audio_paused,
            staged_audio_dropped,
            duration_ms: mux.emitted_end.as_millis() as u64,
        }
    }

    /// Handle one video frame from the capture delivery context.
    ///
    /// Initializes the container on first use, drops paused frames while
    /// letting the timebase pin the pause start, and flushes staged audio
    /// after the first sample lands in the video track.
    pub fn handle_video_frame(&self, frame: VideoFrame) {
        let mut mux = self.mux.lock();
        let first_append = self.process_video(&mut mux, frame);

        if first_append {
            // Atomically swap out everything staged so far; audio arriving
            // from here on sees the flushed flag and bypasses staging.
            let staged = self.staging.lock().take_all();
            if !staged.is_empty() {
                tracing::info!("flushing {} staged audio frames", staged.len());
            }
            for audio in staged {
                Self::process_audio(&mut mux, audio);
            }
        }
    }

    /// Handle one audio frame, from any thread.
    ///
    /// Audio is staged until the video track has accepted a frame, then
    /// appended directly with the same timestamp adjustment.
    pub fn append_audio_frame(&self, frame: AudioFrame) {
        {
            let mut staging = self.staging.lock();
            if !staging.is_flushed() {
                if !staging.enqueue(frame) {
                    tracing::debug!("audio staging cap reached, dropping frame");
                }
                return;
            }
            // Release staging before touching the mux lock; the video path
            // acquires them in the opposite order.
        }

        let mut mux = self.mux.lock();
        Self::process_audio(&mut mux, frame);
    }

    /// Idempotent; effective in any non-terminal phase so a pause raced
    /// against the first frame still takes hold.
    pub fn pause(&self) {
        let mut mux = self.mux.lock();
        if matches!(
            mux.container,
            ContainerState::Finished | ContainerState::Failed
        ) || mux.timebase.is_paused()
        {
            return;
        }
        mux.timebase.pause();
        tracing::info!("writer paused");
    }

    /// Idempotent counterpart of [`Self::pause`]
    pub fn resume(&self) {
        let mut mux = self.mux.lock();
        if matches!(
            mux.container,
            ContainerState::Finished | ContainerState::Failed
        ) || !mux.timebase.is_paused()
        {
            return;
        }
        mux.timebase.resume();
        tracing::info!("writer resumed");
    }

    /// Finish the session and return the destination path.
    ///
    /// With no frames ever received the path points at an empty file and
    /// the caller must discard it. Finalize failures are logged, not
    /// returned: the result is only observable through the file itself.
    /// Safe to call repeatedly; later calls are no-ops.
    pub async fn finish(&self) -> PathBuf {
        let sink = {
            let mut mux = self.mux.lock();
            match std::mem::replace(&mut mux.container, ContainerState::Finished) {
                ContainerState::Writing(sink) => Some(sink),
                ContainerState::Uninitialized => {
                    tracing::warn!(
                        "finish with no frames received, {} has no contents",
                        self.destination.display()
                    );
                    None
                }
                ContainerState::Failed => {
                    mux.container = ContainerState::Failed;
                    None
                }
                ContainerState::Finished => None,
            }
        };

        if let Some(mut sink) = sink {
            // Finalize off the delivery context so in-flight frames are
            // never deadlocked against it.
            match tokio::task::spawn_blocking(move || sink.finalize()).await {
                Ok(Ok(())) => {
                    tracing::info!("container finalized at {}", self.destination.display())
                }
                Ok(Err(e)) => tracing::warn!("container finalize failed: {e}"),
                Err(e) => tracing::warn!("finalize task panicked: {e}"),
            }
        }

        self.destination.clone()
    }

    /// Returns true when this call appended the session's first video frame
    fn process_video(&self, mux: &mut MuxState, frame: VideoFrame) -> bool {
        if matches!(mux.container, ContainerState::Uninitialized) {
            let Some((w, h)) = frame.geometry() else {
                tracing::warn!("first frame carried no usable geometry, waiting for the next");
                return false;
            };
            let spec = SinkSpec {
                destination: self.destination.clone(),
                width: floor_even(w),
                height: floor_even(h),
                codec: self.options.codec,
                audio: self.options.capture_audio,
                video_params: frame.parameter_sets.clone(),
            };
            match (self.factory)(&spec) {
                Ok(sink) => {
                    tracing::info!(
                        "container initialized at {}x{} ({:?})",
                        spec.width,
                        spec.height,
                        spec.codec
                    );
                    mux.container = ContainerState::Writing(sink);
                }
                Err(e) => {
                    // Fail fast; no retries for this session.
                    tracing::warn!("container init failed, session produces no output: {e}");
                    mux.container = ContainerState::Failed;
                    return false;
                }
            }
        }

        match &mux.container {
            ContainerState::Writing(sink) => {
                if !sink.healthy() {
                    tracing::warn!("underlying writer reported failure, dropping all further frames");
                    mux.container = ContainerState::Failed;
                    return false;
                }
            }
            _ => {
                mux.video_dropped += 1;
                return false;
            }
        }

        // Paused frames produce no timestamp; the observation itself pins
        // the pause start.
        let Some(adjusted) = mux.timebase.observe(frame.pts) else {
            mux.video_paused += 1;
            return false;
        };

        let epoch = *mux.epoch.get_or_insert(adjusted);
        if adjusted < epoch {
            mux.video_dropped += 1;
            return false;
        }
        let media = adjusted - epoch;

        let sink = match &mut mux.container {
            ContainerState::Writing(sink) => sink,
            _ => return false,
        };

        if !sink.video_ready() {
            // Dropping beats blocking the capture callback.
            mux.video_dropped += 1;
            tracing::debug!("video track not ready, dropping frame");
            return false;
        }

        if let Some(last) = mux.last_video_pts {
            if media < last {
                mux.video_dropped += 1;
                tracing::warn!(
                    "non-monotonic video timestamp ({}ms < {}ms), dropping frame",
                    media.as_millis(),
                    last.as_millis()
                );
                return false;
            }
        }

        let sample = MediaSample {
            media_time: media,
            duration: frame.duration,
            payload: frame.payload,
            keyframe: frame.keyframe,
        };

        let sink = match &mut mux.container {
            ContainerState::Writing(sink) => sink,
            _ => return false,
        };
        if let Err(e) = sink.append_video(&sample) {
            tracing::warn!("video append failed, failing session: {e}");
            mux.container = ContainerState::Failed;
            mux.video_dropped += 1;
            return false;
        }

        mux.last_video_pts = Some(media);
        mux.emitted_end = media + sample.duration;
        mux.video_frames += 1;
        mux.video_frames == 1
    }

    fn process_audio(mux: &mut MuxState, frame: AudioFrame) {
        if !matches!(mux.container, ContainerState::Writing(_)) {
            mux.audio_dropped += 1;
            return;
        }

        let Some(adjusted) = mux.timebase.observe(frame.pts) else {
            // Paused; dropped like its video counterpart.
            mux.audio_paused += 1;
            return;
        };

        let Some(epoch) = mux.epoch else {
            mux.audio_dropped += 1;
            return;
        };
        if adjusted < epoch {
            // Staged before the session start; discard.
            mux.audio_dropped += 1;
            return;
        }
        let media = adjusted - epoch;

        let sink = match &mut mux.container {
            ContainerState::Writing(sink) => sink,
            _ => return,
        };

        if !sink.audio_ready() {
            mux.audio_dropped += 1;
            return;
        }

        if let Some(last) = mux.last_audio_pts {
            if media < last {
                mux.audio_dropped += 1;
                return;
            }
        }

        let sample = MediaSample {
            media_time: media,
            duration: frame.duration,
            payload: frame.payload,
            keyframe: true,
        };

        let sink = match &mut mux.container {
            ContainerState::Writing(sink) => sink,
            _ => return,
        };
        if let Err(e) = sink.append_audio(&sample) {
            tracing::warn!("audio append failed, failing session: {e}");
            mux.container = ContainerState::Failed;
            mux.audio_dropped += 1;
            return;
        }

        mux.last_audio_pts = Some(media);
        mux.audio_frames += 1;
    }
}

/// Container codecs reject odd dimensions
fn floor_even(v: u32) -> u32 {
    v & !1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct SinkLog {
        video: Mutex<Vec<MediaSample>>,
        audio: Mutex<Vec<MediaSample>>,
        specs: Mutex<Vec<SinkSpec>>,
        finalized: AtomicBool,
        video_ready: AtomicBool,
        fail_appends: AtomicBool,
        unhealthy: AtomicBool,
    }

    struct RecordingSink {
        log: Arc<SinkLog>,
    }

    impl ContainerSink for RecordingSink {
        fn append_video(&mut self, sample: &MediaSample) -> crate::error::CaptureResult<()> {
            if self.log.fail_appends.load(Ordering::SeqCst) {
                return Err(crate::error::CaptureError::WriterFailed("boom".into()));
            }
            self.log.video.lock().push(sample.clone());
            Ok(())
        }

        fn append_audio(&mut self, sample: &MediaSample) -> crate::error::CaptureResult<()> {
            self.log.audio.lock().push(sample.clone());
            Ok(())
        }

        fn video_ready(&self) -> bool {
            self.log.video_ready.load(Ordering::SeqCst)
        }

        fn healthy(&self) -> bool {
            !self.log.unhealthy.load(Ordering::SeqCst)
        }

        fn finalize(&mut self) -> crate::error::CaptureResult<()> {
            self.log.finalized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn recording_writer(audio: bool) -> (ContainerWriter, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        log.video_ready.store(true, Ordering::SeqCst);
        let factory_log = log.clone();
        let writer = ContainerWriter::with_factory(
            "/tmp/out.mp4",
            WriterOptions {
                capture_audio: audio,
                codec: VideoCodec::H264,
                staging_cap: 8,
            },
            Arc::new(move |spec| {
                factory_log.specs.lock().push(spec.clone());
                Ok(Box::new(RecordingSink {
                    log: factory_log.clone(),
                }))
            }),
        );
        (writer, log)
    }

    fn failing_writer() -> ContainerWriter {
        ContainerWriter::with_factory(
            "/tmp/out.mp4",
            WriterOptions::default(),
            Arc::new(|_| Err(crate::error::CaptureError::ContainerInit("nope".into()))),
        )
    }

    fn video(pts_ms: u64) -> VideoFrame {
        VideoFrame {
            payload: Bytes::from_static(b"v"),
            pts: Duration::from_millis(pts_ms),
            duration: Duration::from_millis(33),
            width: 1920,
            height: 1080,
            content_rect: None,
            keyframe: true,
            parameter_sets: Vec::new(),
        }
    }

    fn audio(pts_ms: u64) -> AudioFrame {
        AudioFrame {
            payload: Bytes::from_static(b"a"),
            pts: Duration::from_millis(pts_ms),
            duration: Duration::from_millis(23),
            sample_rate: 44_100,
            channels: 1,
        }
    }

    #[test]
    fn test_lazy_init_and_epoch() {
        let (writer, log) = recording_writer(false);
        assert_eq!(writer.phase(), ContainerPhase::Uninitialized);

        writer.handle_video_frame(video(1000));
        assert_eq!(writer.phase(), ContainerPhase::Writing);

        writer.handle_video_frame(video(1033));
        let samples = log.video.lock();
        // File time starts at zero regardless of the source clock.
        assert_eq!(samples[0].media_time, Duration::ZERO);
        assert_eq!(samples[1].media_time, Duration::from_millis(33));
    }

    #[test]
    fn test_odd_dimensions_floored() {
        let (writer, log) = recording_writer(false);
        let mut f = video(0);
        f.width = 1921;
        f.height = 1081;
        writer.handle_video_frame(f);
        let specs = log.specs.lock();
        assert_eq!((specs[0].width, specs[0].height), (1920, 1080));
    }

    #[test]
    fn test_init_failure_is_terminal() {
        let writer = failing_writer();
        writer.handle_video_frame(video(0));
        assert_eq!(writer.phase(), ContainerPhase::Failed);
        // No retry on later frames.
        writer.handle_video_frame(video(33));
        assert_eq!(writer.phase(), ContainerPhase::Failed);
        assert_eq!(writer.stats().video_frames, 0);
    }

    #[test]
    fn test_geometry_missing_waits_for_next_frame() {
        let (writer, log) = recording_writer(false);
        let mut f = video(0);
        f.width = 0;
        f.height = 0;
        writer.handle_video_frame(f);
        assert_eq!(writer.phase(), ContainerPhase::Uninitialized);

        writer.handle_video_frame(video(33));
        assert_eq!(writer.phase(), ContainerPhase::Writing);
        assert_eq!(log.video.lock().len(), 1);
    }

    #[test]
    fn test_pause_gap_removed() {
        let (writer, log) = recording_writer(false);
        writer.handle_video_frame(video(0));
        writer.handle_video_frame(video(500));

        writer.pause();
        writer.handle_video_frame(video(533));
        writer.handle_video_frame(video(1900));
        writer.resume();
        writer.handle_video_frame(video(2000));

        let samples = log.video.lock();
        assert_eq!(samples.len(), 3);
        // The post-resume frame lands right after the pre-pause one.
        assert_eq!(samples[1].media_time, Duration::from_millis(500));
        assert_eq!(samples[2].media_time, Duration::from_millis(533));
    }

    #[test]
    fn test_not_ready_drops_without_failing() {
        let (writer, log) = recording_writer(false);
        writer.handle_video_frame(video(0));
        log.video_ready.store(false, Ordering::SeqCst);
        writer.handle_video_frame(video(33));
        log.video_ready.store(true, Ordering::SeqCst);
        writer.handle_video_frame(video(66));

        assert_eq!(writer.phase(), ContainerPhase::Writing);
        let stats = writer.stats();
        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.video_dropped, 1);
    }

    #[test]
    fn test_append_failure_fails_session() {
        let (writer, log) = recording_writer(false);
        writer.handle_video_frame(video(0));
        log.fail_appends.store(true, Ordering::SeqCst);
        writer.handle_video_frame(video(33));
        assert_eq!(writer.phase(), ContainerPhase::Failed);

        // Subsequent frames are silently dropped, no panic.
        log.fail_appends.store(false, Ordering::SeqCst);
        writer.handle_video_frame(video(66));
        assert_eq!(writer.stats().video_frames, 1);
    }

    #[test]
    fn test_unhealthy_sink_fails_session() {
        let (writer, log) = recording_writer(false);
        writer.handle_video_frame(video(0));
        log.unhealthy.store(true, Ordering::SeqCst);
        writer.handle_video_frame(video(33));
        assert_eq!(writer.phase(), ContainerPhase::Failed);
    }

    #[test]
    fn test_audio_staged_until_first_video_then_flushed_in_order() {
        let (writer, log) = recording_writer(true);
        writer.append_audio_frame(audio(10));
        writer.append_audio_frame(audio(33));
        assert!(log.audio.lock().is_empty());

        writer.handle_video_frame(video(20));
        let samples = log.audio.lock();
        // Frame at 10ms predates the session epoch and is discarded; the
        // rest keep arrival order.
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].media_time, Duration::from_millis(13));
    }

    #[test]
    fn test_audio_bypasses_staging_after_flush() {
        let (writer, log) = recording_writer(true);
        writer.handle_video_frame(video(0));
        writer.append_audio_frame(audio(100));
        assert_eq!(log.audio.lock().len(), 1);
        assert_eq!(writer.stats().audio_frames, 1);
    }

    #[test]
    fn test_pause_before_any_frame() {
        let (writer, log) = recording_writer(false);
        writer.pause();
        writer.handle_video_frame(video(100));
        assert_eq!(log.video.lock().len(), 0);

        writer.resume();
        writer.handle_video_frame(video(400));
        let samples = log.video.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].media_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_finish_without_frames_returns_path() {
        let (writer, log) = recording_writer(false);
        let path = writer.finish().await;
        assert_eq!(path, PathBuf::from("/tmp/out.mp4"));
        assert_eq!(writer.phase(), ContainerPhase::Finished);
        assert!(!log.finalized.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finish_finalizes_and_is_idempotent() {
        let (writer, log) = recording_writer(false);
        writer.handle_video_frame(video(0));
        let path = writer.finish().await;
        assert!(log.finalized.load(Ordering::SeqCst));
        assert_eq!(writer.phase(), ContainerPhase::Finished);

        // Second call is a no-op returning the same path.
        assert_eq!(writer.finish().await, path);

        // Frames after finish are dropped.
        writer.handle_video_frame(video(33));
        assert_eq!(writer.stats().video_frames, 1);
    }

    #[tokio::test]
    async fn test_finish_after_failure_keeps_failed_phase() {
        let writer = failing_writer();
        writer.handle_video_frame(video(0));
        let path = writer.finish().await;
        assert_eq!(path, PathBuf::from("/tmp/out.mp4"));
        assert_eq!(writer.phase(), ContainerPhase::Failed);
    }
}
