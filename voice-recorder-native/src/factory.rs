//! `ComponentFactory` wiring the desktop adapters together.

use std::path::PathBuf;

use voice_recorder_core::models::config::{PipelineConfig, PlatformCapabilities, OPUS_MIN_PLATFORM_LEVEL};
use voice_recorder_core::models::error::PipelineError;
use voice_recorder_core::models::format::AudioCodec;
use voice_recorder_core::storage;
use voice_recorder_core::traits::capture_source::CaptureSource;
use voice_recorder_core::traits::codec_adapter::CodecAdapter;
use voice_recorder_core::traits::component_factory::ComponentFactory;
use voice_recorder_core::traits::container_sink::ContainerSink;

use crate::ffmpeg_aac::FfmpegAacCodec;
use crate::wav_source::WavFileSource;

/// Where session audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureInput {
    /// Play a WAV file into the pipeline.
    WavFile(PathBuf),
    /// The system default microphone.
    #[cfg(feature = "cpal")]
    DefaultMicrophone,
}

#[derive(Debug, Clone)]
pub struct NativeComponents {
    input: CaptureInput,
    /// Pace WAV input to its sample rate.
    realtime: bool,
    ffmpeg_binary: PathBuf,
}

impl NativeComponents {
    pub fn new(input: CaptureInput) -> Self {
        Self {
            input,
            realtime: true,
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Read WAV input as fast as the encoder accepts it.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn with_ffmpeg(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ffmpeg_binary = binary.into();
        self
    }

    pub fn input(&self) -> &CaptureInput {
        &self.input
    }
}

impl ComponentFactory for NativeComponents {
    /// Opus needs the in-process encoder, so the Opus level is only reported
    /// when it is compiled in.
    fn capabilities(&self) -> PlatformCapabilities {
        if cfg!(feature = "opus") {
            PlatformCapabilities::new(OPUS_MIN_PLATFORM_LEVEL)
        } else {
            PlatformCapabilities::baseline()
        }
    }

    fn open_capture(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>, PipelineError> {
        match &self.input {
            CaptureInput::WavFile(path) => Ok(Box::new(WavFileSource::open(path, config, self.realtime)?)),
            #[cfg(feature = "cpal")]
            CaptureInput::DefaultMicrophone => {
                Ok(Box::new(crate::cpal_source::CpalMicSource::open_default(config)?))
            }
        }
    }

    fn create_codec(&self, config: &PipelineConfig) -> Result<Box<dyn CodecAdapter>, PipelineError> {
        match config.container_kind.codec() {
            AudioCodec::Aac => Ok(Box::new(FfmpegAacCodec::with_binary(&self.ffmpeg_binary))),
            #[cfg(feature = "opus")]
            AudioCodec::Opus => Ok(Box::new(crate::opus_codec::OpusCodec::new())),
            #[cfg(not(feature = "opus"))]
            AudioCodec::Opus => Err(PipelineError::UnsupportedFormat(
                "built without the opus feature".into(),
            )),
        }
    }

    fn create_sink(&self, config: &PipelineConfig) -> Result<Box<dyn ContainerSink>, PipelineError> {
        storage::create_sink(config)
    }
}
