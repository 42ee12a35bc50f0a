//! # voice-recorder-core
//!
//! Platform-agnostic voice recording pipeline.
//!
//! A single `PipelineController` pulls PCM from a capture source, pushes it
//! through an encoder and muxes the compressed units into a container file.
//! Platform backends implement `CaptureSource`, `CodecAdapter` and
//! `ContainerSink` and hand them out through a `ComponentFactory`.
//!
//! ## Architecture
//!
//! ```text
//! voice-recorder-core (this crate)
//! ├── traits/       ← CaptureSource, CodecAdapter, ContainerSink, ComponentFactory, PipelineDelegate
//! ├── models/       ← PipelineError, PipelineState, PipelineConfig, AccessUnit, OutputFormat, etc.
//! ├── processing/   ← RingBuffer, PCM helpers, ADTS framing, Opus headers
//! ├── session/      ← PipelineController (state machine + audio-encode worker)
//! └── storage/      ← Mp4FileSink, OggOpusSink, checksum, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AccessUnit, AudioLevels, PcmFrame, PipelineStats, SubmitOutcome, TrackId, UnitFlags,
};
pub use models::config::{ContainerKind, PipelineConfig, PipelineTimings, PlatformCapabilities, SampleFormat};
pub use models::error::PipelineError;
pub use models::format::{AudioCodec, CodecParams, CodecRole, OutputFormat};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::PipelineState;
pub use processing::ring_buffer::RingBuffer;
pub use session::controller::PipelineController;
pub use storage::mp4_writer::Mp4FileSink;
pub use storage::ogg_writer::OggOpusSink;
pub use traits::capture_source::CaptureSource;
pub use traits::codec_adapter::CodecAdapter;
pub use traits::component_factory::ComponentFactory;
pub use traits::container_sink::ContainerSink;
pub use traits::pipeline_delegate::PipelineDelegate;
