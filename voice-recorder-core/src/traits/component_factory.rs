use crate::models::config::{PipelineConfig, PlatformCapabilities};
use crate::models::error::PipelineError;
use crate::traits::capture_source::CaptureSource;
use crate::traits::codec_adapter::CodecAdapter;
use crate::traits::container_sink::ContainerSink;

/// Builds the three session resources for a given configuration.
///
/// The controller calls these in order capture → codec → sink and owns
/// whatever they return until the session ends.
pub trait ComponentFactory: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    /// Open and start the capture device. Fails with `DeviceUnavailable`.
    fn open_capture(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>, PipelineError>;

    /// Create an unconfigured encoder for `config.container_kind`.
    fn create_codec(&self, config: &PipelineConfig) -> Result<Box<dyn CodecAdapter>, PipelineError>;

    /// Create the muxer for `config.output_path`. No track is added yet.
    fn create_sink(&self, config: &PipelineConfig) -> Result<Box<dyn ContainerSink>, PipelineError>;
}
