//! MP4 container sink
//!
//! Thin wrapper over the `mp4` crate: creates the file, registers the
//! tracks, converts output timestamps into track timescale units, and
//! writes the moov on finalize.

use crate::error::{CaptureError, CaptureResult};
use crate::muxer::sink::{ContainerSink, MediaSample, SinkSpec, VideoCodec};
use mp4::{
    AacConfig, AudioObjectType, AvcConfig, ChannelConfig, FourCC, HevcConfig, MediaConfig,
    Mp4Config, Mp4Sample, Mp4Writer, SampleFreqIndex, TrackConfig, TrackType,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;

/// Movie-level timescale (ticks per second)
const MOVIE_TIMESCALE: u32 = 1000;

/// Video track timescale
const VIDEO_TIMESCALE: u32 = 90_000;

/// Audio track timescale, matching the 44.1 kHz mono track
const AUDIO_TIMESCALE: u32 = 44_100;

/// Audio track bitrate
const AUDIO_BITRATE: u32 = 64_000;

fn brand(tag: &str) -> CaptureResult<FourCC> {
    tag.parse::<FourCC>()
        .map_err(|_| CaptureError::ContainerInit(format!("invalid brand {tag}")))
}

fn to_timescale(time: Duration, timescale: u32) -> u64 {
    (time.as_nanos() * timescale as u128 / 1_000_000_000) as u64
}

/// MP4 file sink with one video track and an optional mono AAC track
pub struct Mp4Sink {
    // Taken on finalize so the inner writer can be flushed explicitly.
    writer: Option<Mp4Writer<BufWriter<File>>>,
    video_track: u32,
    audio_track: Option<u32>,
    healthy: bool,
}

impl Mp4Sink {
    /// Create the container at `spec.destination` with its tracks.
    ///
    /// Any failure here is a `ContainerInit` error; the caller fails the
    /// session fast rather than retrying.
    pub fn open(spec: &SinkSpec) -> CaptureResult<Box<dyn ContainerSink>> {
        let file = File::create(&spec.destination)?;

        let config = Mp4Config {
            major_brand: brand("isom")?,
            minor_version: 512,
            compatible_brands: vec![brand("isom")?, brand("iso2")?, brand("mp41")?],
            timescale: MOVIE_TIMESCALE,
        };

        let mut writer = Mp4Writer::write_start(BufWriter::new(file), &config)
            .map_err(|e| CaptureError::ContainerInit(format!("container start: {e}")))?;

        let width = spec.width.min(u16::MAX as u32) as u16;
        let height = spec.height.min(u16::MAX as u32) as u16;

        let media_conf = match spec.codec {
            VideoCodec::H264 => MediaConfig::AvcConfig(AvcConfig {
                width,
                height,
                seq_param_set: spec
                    .video_params
                    .first()
                    .map(|p| p.to_vec())
                    .unwrap_or_default(),
                pic_param_set: spec
                    .video_params
                    .get(1)
                    .map(|p| p.to_vec())
                    .unwrap_or_default(),
            }),
            VideoCodec::Hevc => MediaConfig::HevcConfig(HevcConfig { width, height }),
        };

        writer
            .add_track(&TrackConfig {
                track_type: TrackType::Video,
                timescale: VIDEO_TIMESCALE,
                language: "und".to_string(),
                media_conf,
            })
            .map_err(|e| CaptureError::ContainerInit(format!("video track: {e}")))?;

        // Track ids are assigned in registration order, starting at 1.
        let video_track = 1;
        let audio_track = if spec.audio {
            writer
                .add_track(&TrackConfig {
                    track_type: TrackType::Audio,
                    timescale: AUDIO_TIMESCALE,
                    language: "und".to_string(),
                    media_conf: MediaConfig::AacConfig(AacConfig {
                        bitrate: AUDIO_BITRATE,
                        profile: AudioObjectType::AacLowComplexity,
                        freq_index: SampleFreqIndex::Freq44100,
                        chan_conf: ChannelConfig::Mono,
                    }),
                })
                .map_err(|e| CaptureError::ContainerInit(format!("audio track: {e}")))?;
            Some(2)
        } else {
            None
        };

        Ok(Box::new(Self {
            writer: Some(writer),
            video_track,
            audio_track,
            healthy: true,
        }))
    }

    fn write(&mut self, track: u32, timescale: u32, sample: &MediaSample) -> CaptureResult<()> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Err(CaptureError::WriterFailed("container already finalized".into())),
        };

        let mp4_sample = Mp4Sample {
            start_time: to_timescale(sample.media_time, timescale),
            duration: to_timescale(sample.duration, timescale) as u32,
            rendering_offset: 0,
            is_sync: sample.keyframe,
            bytes: sample.payload.clone(),
        };

        writer.write_sample(track, &mp4_sample).map_err(|e| {
            self.healthy = false;
            CaptureError::WriterFailed(format!("sample write: {e}"))
        })
    }
}

impl ContainerSink for Mp4Sink {
    fn append_video(&mut self, sample: &MediaSample) -> CaptureResult<()> {
        self.write(self.video_track, VIDEO_TIMESCALE, sample)
    }

    fn append_audio(&mut self, sample: &MediaSample) -> CaptureResult<()> {
        let track = match self.audio_track {
            Some(t) => t,
            None => return Err(CaptureError::WriterFailed("no audio track".into())),
        };
        self.write(track, AUDIO_TIMESCALE, sample)
    }

    fn healthy(&self) -> bool {
        self.healthy && self.writer.is_some()
    }

    fn finalize(&mut self) -> CaptureResult<()> {
        let mut writer = match self.writer.take() {
            Some(w) => w,
            None => return Ok(()),
        };

        writer
            .write_end()
            .map_err(|e| CaptureError::WriterFailed(format!("container end: {e}")))?;

        writer
            .into_writer()
            .flush()
            .map_err(|e| CaptureError::WriterFailed(format!("flush: {e}")))
    }
}
