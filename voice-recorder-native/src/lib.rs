//! # voice-recorder-native
//!
//! Desktop adapters for voice-recorder-core.
//!
//! Provides:
//! - `WavFileSource`: WAV file played in as live capture (hound)
//! - `CpalMicSource`: default microphone through cpal (`cpal` feature)
//! - `FfmpegAacCodec`: AAC-LC through an `ffmpeg` subprocess emitting ADTS
//! - `OpusCodec`: libopus encoder (`opus` feature)
//! - `NativeComponents`: the `ComponentFactory` tying them together
//!
//! ## Requirements
//! - `ffmpeg` on `PATH` for AAC output
//! - ALSA/CoreAudio/WASAPI dev libraries when built with `cpal`
//! - libopus when built with `opus`
//!
//! ## Usage
//! ```ignore
//! use voice_recorder_core::{ContainerKind, PipelineConfig, PipelineController};
//! use voice_recorder_native::{CaptureInput, NativeComponents};
//!
//! let factory = NativeComponents::new(CaptureInput::WavFile("speech.wav".into()));
//! let mut controller = PipelineController::new(factory);
//! controller.start(PipelineConfig::new(ContainerKind::AacInMp4, "speech.m4a"))?;
//! // ...
//! let result = controller.stop()?;
//! ```

pub mod factory;
pub mod ffmpeg_aac;
pub mod wav_source;

#[cfg(feature = "cpal")]
pub mod cpal_source;
#[cfg(feature = "opus")]
pub mod opus_codec;

pub use factory::{CaptureInput, NativeComponents};
pub use ffmpeg_aac::FfmpegAacCodec;
pub use wav_source::WavFileSource;

#[cfg(feature = "cpal")]
pub use cpal_source::CpalMicSource;
#[cfg(feature = "opus")]
pub use opus_codec::OpusCodec;
