use std::time::Duration;

use crate::models::audio_models::{AccessUnit, SubmitOutcome};
use crate::models::error::PipelineError;
use crate::models::format::{CodecParams, OutputFormat};

/// Buffer-exchange wrapper around an audio encoder.
///
/// The caller pushes PCM into input slots and polls for compressed output.
/// Both directions are bounded by the timeouts passed in; an adapter is free
/// to block on a condition variable or channel instead of spinning.
///
/// Implemented by:
/// - `FfmpegAacCodec` (voice-recorder-native)
/// - `OpusCodec` (voice-recorder-native, `opus` feature)
pub trait CodecAdapter: Send {
    /// Fails with `UnsupportedFormat` when the encoder can't produce `params`.
    fn configure(&mut self, params: &CodecParams) -> Result<(), PipelineError>;

    fn start(&mut self) -> Result<(), PipelineError>;

    /// Bytes one input slot holds; longer submissions are truncated by the caller.
    fn input_capacity(&self) -> usize;

    /// Offer `input` to the encoder, waiting up to `timeout` for a free slot.
    ///
    /// An empty `input` with `end_of_stream` set asks the encoder to flush.
    fn try_submit_input(
        &mut self,
        input: &[u8],
        timestamp_us: u64,
        end_of_stream: bool,
        timeout: Duration,
    ) -> Result<SubmitOutcome, PipelineError>;

    /// Take the next output unit, waiting up to `timeout`. `None` means empty.
    fn try_take_output(&mut self, timeout: Duration) -> Result<Option<AccessUnit>, PipelineError>;

    /// The finalized output format; `None` until the first config unit has been emitted.
    fn output_format(&self) -> Option<OutputFormat>;

    /// Stop encoding. May fail on an encoder that is already broken.
    fn stop(&mut self) -> Result<(), PipelineError>;

    /// Free the encoder. Must be safe to call after any earlier error, and more than once.
    fn release(&mut self);
}
