use crate::models::audio_models::TrackId;
use crate::models::error::PipelineError;
use crate::models::format::OutputFormat;

/// A muxer writing timestamped compressed samples into a container file.
///
/// Call order: `add_track` once → `start` → `write_sample`* → `set_end_timestamp`? → `finalize` → `release`.
/// `finalize` and `release` are also valid without a track (an empty recording).
pub trait ContainerSink: Send {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackId, PipelineError>;

    fn start(&mut self) -> Result<(), PipelineError>;

    fn write_sample(&mut self, track: TrackId, payload: &[u8], timestamp_us: u64) -> Result<(), PipelineError>;

    /// Where the track's real audio ends, taken from the codec's end-of-stream
    /// unit. Formats with end trimming use it to cut encoder padding from the
    /// last sample; others ignore it.
    fn set_end_timestamp(&mut self, _track: TrackId, _timestamp_us: u64) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Write the index/trailer so the file is playable. Idempotent.
    fn finalize(&mut self) -> Result<(), PipelineError>;

    /// Close the file handle. Idempotent, never fails.
    fn release(&mut self);
}
