use thiserror::Error;

/// Errors surfaced by the recording pipeline and its adapters.
///
/// `Clone` so the controller can keep the first failure and hand it back
/// from every later `stop()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported codec format: {0}")]
    UnsupportedFormat(String),

    #[error("codec error: {0}")]
    CodecError(String),

    #[error("sink error: {0}")]
    SinkError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the error originated in the encoder (configure, submit or take).
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::CodecError(_))
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, Self::SinkError(_))
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}
