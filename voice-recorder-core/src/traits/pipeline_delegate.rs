use crate::models::audio_models::AudioLevels;
use crate::models::error::PipelineError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::PipelineState;

/// Event delegate for pipeline notifications.
///
/// Every method is called from the `audio-encode` worker thread except the
/// `Starting`/`Failed` notifications raised synchronously inside `start()`.
/// Implementations should marshal to a UI thread themselves and return quickly;
/// a slow delegate stalls capture.
pub trait PipelineDelegate: Send + Sync {
    fn on_state_changed(&self, state: PipelineState);

    /// Called at most every 100 ms with the levels of the latest frame.
    fn on_levels_updated(&self, _levels: &AudioLevels) {}

    /// Called once with the error that moved the session to `Failed`.
    fn on_error(&self, error: &PipelineError);

    /// Called once the container file is finalized and checksummed.
    fn on_recording_finished(&self, result: &RecordingResult);
}
