use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::format::AudioCodec;
use crate::processing::adts;

/// Capability level every host provides; AAC in MP4 needs nothing more.
pub const BASELINE_PLATFORM_LEVEL: u32 = 1;

/// First capability level that ships an Opus encoder and an Ogg muxer.
pub const OPUS_MIN_PLATFORM_LEVEL: u32 = 29;

/// Sample rates libopus accepts as encoder input.
pub const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Container/codec combination produced by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// AAC-LC access units in an MP4 (`.m4a`) file.
    AacInMp4,
    /// Opus packets in an Ogg (`.opus`) file.
    OpusInOgg,
}

impl ContainerKind {
    pub fn codec(&self) -> AudioCodec {
        match self {
            Self::AacInMp4 => AudioCodec::Aac,
            Self::OpusInOgg => AudioCodec::Opus,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::AacInMp4 => "m4a",
            Self::OpusInOgg => "opus",
        }
    }

    /// Pick the container from an output file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "m4a" | "mp4" => Some(Self::AacInMp4),
            "opus" | "ogg" => Some(Self::OpusInOgg),
            _ => None,
        }
    }

    pub fn min_platform_level(&self) -> u32 {
        match self {
            Self::AacInMp4 => BASELINE_PLATFORM_LEVEL,
            Self::OpusInOgg => OPUS_MIN_PLATFORM_LEVEL,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AacInMp4 => f.write_str("aac_in_mp4"),
            Self::OpusInOgg => f.write_str("opus_in_ogg"),
        }
    }
}

/// Raw sample layout delivered by the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM.
    Pcm16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Pcm16 => 2,
        }
    }
}

/// What the host platform can encode and mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub level: u32,
}

impl PlatformCapabilities {
    pub fn new(level: u32) -> Self {
        Self { level }
    }

    pub fn baseline() -> Self {
        Self::new(BASELINE_PLATFORM_LEVEL)
    }

    pub fn supports(&self, kind: ContainerKind) -> bool {
        self.level >= kind.min_platform_level()
    }
}

/// Bounded waits used by the worker loop and the end-of-stream flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimings {
    /// How long one frame may wait for a codec input slot before it is dropped.
    pub input_slot_timeout: Duration,
    /// Wait for the first output poll of each drain pass; later polls don't wait.
    pub output_poll_timeout: Duration,
    /// Upper bound a capture source should block in one `read`.
    pub capture_read_timeout: Duration,
    /// Wait per poll while draining after end-of-stream was submitted.
    pub eos_poll_timeout: Duration,
    /// Consecutive empty polls after which the flush gives up on an end-of-stream unit.
    pub eos_max_empty_polls: u32,
    /// Attempts at placing the end-of-stream marker into an input slot.
    pub eos_submit_attempts: u32,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            input_slot_timeout: Duration::from_millis(10),
            output_poll_timeout: Duration::from_millis(10),
            capture_read_timeout: Duration::from_millis(20),
            eos_poll_timeout: Duration::from_millis(10),
            eos_max_empty_polls: 50,
            eos_submit_attempts: 10,
        }
    }
}

/// Configuration for one recording session. Immutable once started.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Capture and encode sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Always 1; the recorder captures mono.
    pub channel_count: u16,

    pub sample_format: SampleFormat,

    /// Encoder target bitrate in bits/s (default: 64000).
    pub target_bitrate: u32,

    pub container_kind: ContainerKind,

    /// Where the container file is written.
    pub output_path: PathBuf,

    /// Capacity of one capture read in bytes. `None` uses 20 ms of audio.
    pub frame_bytes: Option<usize>,

    /// Stop automatically once this much wall-clock time has been recorded.
    pub max_duration: Option<Duration>,

    /// Write `<output>.metadata.json` after a successful stop.
    pub write_metadata: bool,

    pub timings: PipelineTimings,
}

impl PipelineConfig {
    pub fn new(container_kind: ContainerKind, output_path: impl Into<PathBuf>) -> Self {
        Self {
            container_kind,
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    /// Bytes per capture read after applying the 20 ms default.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes.unwrap_or_else(|| {
            let samples = (self.sample_rate / 50).max(1) as usize;
            samples * self.channel_count as usize * self.sample_format.bytes_per_sample()
        })
    }

    /// Bytes of PCM per second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64
            * self.channel_count as u64
            * self.sample_format.bytes_per_sample() as u64
    }

    pub fn validate(&self, capabilities: &PlatformCapabilities) -> Result<(), PipelineError> {
        if self.sample_rate == 0 {
            return Err(PipelineError::UnsupportedConfiguration(
                "sample rate must be positive".into(),
            ));
        }
        if self.target_bitrate == 0 {
            return Err(PipelineError::UnsupportedConfiguration(
                "bitrate must be positive".into(),
            ));
        }
        if self.channel_count != 1 {
            return Err(PipelineError::UnsupportedConfiguration(format!(
                "unsupported channel count: {} (mono only)",
                self.channel_count
            )));
        }
        if let Some(bytes) = self.frame_bytes {
            if bytes == 0 || bytes % self.sample_format.bytes_per_sample() != 0 {
                return Err(PipelineError::UnsupportedConfiguration(format!(
                    "frame size must be a positive multiple of the sample size, got {}",
                    bytes
                )));
            }
        }
        if !capabilities.supports(self.container_kind) {
            return Err(PipelineError::UnsupportedConfiguration(format!(
                "{} requires platform level {}, have {}",
                self.container_kind,
                self.container_kind.min_platform_level(),
                capabilities.level
            )));
        }
        match self.container_kind {
            ContainerKind::OpusInOgg if !OPUS_SAMPLE_RATES.contains(&self.sample_rate) => {
                Err(PipelineError::UnsupportedConfiguration(format!(
                    "opus cannot encode at {} Hz",
                    self.sample_rate
                )))
            }
            ContainerKind::AacInMp4 if adts::sampling_frequency_index(self.sample_rate).is_none() => {
                Err(PipelineError::UnsupportedConfiguration(format!(
                    "aac cannot encode at {} Hz",
                    self.sample_rate
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channel_count: 1,
            sample_format: SampleFormat::Pcm16,
            target_bitrate: 64000,
            container_kind: ContainerKind::AacInMp4,
            output_path: PathBuf::from("recording.m4a"),
            frame_bytes: None,
            max_duration: None,
            write_metadata: false,
            timings: PipelineTimings::default(),
        }
    }
}
