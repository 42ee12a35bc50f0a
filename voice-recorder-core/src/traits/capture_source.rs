use crate::models::audio_models::PcmFrame;
use crate::models::error::PipelineError;

/// A live PCM source, opened through `ComponentFactory::open_capture`.
///
/// Implemented by:
/// - `WavFileSource` (voice-recorder-native)
/// - `CpalMicSource` (voice-recorder-native, `cpal` feature)
pub trait CaptureSource: Send {
    /// Fill `frame` with up to `frame.capacity()` bytes of 16-bit mono PCM.
    ///
    /// Blocks for at most the configured capture-read timeout. Returning
    /// `Ok(0)` means nothing arrived in time and is not an error.
    fn read(&mut self, frame: &mut PcmFrame) -> Result<usize, PipelineError>;

    /// Stop the device and release it. Idempotent.
    fn close(&mut self);
}
