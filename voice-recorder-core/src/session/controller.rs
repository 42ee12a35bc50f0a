use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_models::{AccessUnit, AudioLevels, PcmFrame, PipelineStats, SubmitOutcome, TrackId};
use crate::models::config::PipelineConfig;
use crate::models::error::PipelineError;
use crate::models::format::{CodecParams, CodecRole};
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::{AtomicPipelineState, PipelineState};
use crate::processing::pcm;
use crate::storage::{checksum, metadata};
use crate::traits::capture_source::CaptureSource;
use crate::traits::codec_adapter::CodecAdapter;
use crate::traits::component_factory::ComponentFactory;
use crate::traits::container_sink::ContainerSink;
use crate::traits::pipeline_delegate::PipelineDelegate;

const LEVELS_INTERVAL: Duration = Duration::from_millis(100);

/// Written by the worker, read by the caller. Never drives control flow.
#[derive(Default)]
struct SharedStatus {
    stats: PipelineStats,
    levels: AudioLevels,
    error: Option<PipelineError>,
    result: Option<RecordingResult>,
}

/// The three per-session handles, in acquisition order.
///
/// Each slot is `None` until acquired and `None` again once released, so
/// `release` can run from any point of a partial start or a failed loop.
#[derive(Default)]
struct SessionResources {
    capture: Option<Box<dyn CaptureSource>>,
    codec: Option<Box<dyn CodecAdapter>>,
    sink: Option<Box<dyn ContainerSink>>,
}

impl SessionResources {
    fn capture(&mut self) -> Result<&mut (dyn CaptureSource + 'static), PipelineError> {
        self.capture
            .as_deref_mut()
            .ok_or_else(|| PipelineError::Internal("capture source already released".into()))
    }

    fn codec(&mut self) -> Result<&mut (dyn CodecAdapter + 'static), PipelineError> {
        self.codec
            .as_deref_mut()
            .ok_or_else(|| PipelineError::Internal("codec already released".into()))
    }

    fn sink(&mut self) -> Result<&mut (dyn ContainerSink + 'static), PipelineError> {
        self.sink
            .as_deref_mut()
            .ok_or_else(|| PipelineError::Internal("sink already released".into()))
    }

    /// Close capture, stop and release the codec, finalize and release the sink.
    ///
    /// Codec `stop` errors are logged and dropped. A finalize error is
    /// returned, but only after every resource has been released.
    fn release(&mut self) -> Result<(), PipelineError> {
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        if let Some(mut codec) = self.codec.take() {
            if let Err(e) = codec.stop() {
                log::warn!("Ignoring codec stop error during teardown: {}", e);
            }
            codec.release();
        }
        let mut outcome = Ok(());
        if let Some(mut sink) = self.sink.take() {
            outcome = sink.finalize();
            sink.release();
        }
        outcome
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Releasing session resources on drop: {}", e);
        }
    }
}

/// Owns one recording session: capture → encode → mux on a worker thread.
///
/// ```text
/// [CaptureSource] → PcmFrame → [CodecAdapter] → AccessUnit → [ContainerSink]
///                        └──────── audio-encode thread ────────┘
/// ```
///
/// `start` validates, acquires the three resources through the factory and
/// spawns the worker. `stop` flips the state and joins the worker, so the
/// container file is finalized by the time it returns.
pub struct PipelineController<F: ComponentFactory> {
    factory: F,
    state: Arc<AtomicPipelineState>,
    shared: Arc<Mutex<SharedStatus>>,
    delegate: Option<Arc<dyn PipelineDelegate>>,
    config: Option<PipelineConfig>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<F: ComponentFactory> PipelineController<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: Arc::new(AtomicPipelineState::new(PipelineState::Idle)),
            shared: Arc::new(Mutex::new(SharedStatus::default())),
            delegate: None,
            config: None,
            worker: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn PipelineDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.lock().stats
    }

    pub fn current_levels(&self) -> AudioLevels {
        self.shared.lock().levels
    }

    /// The error that moved the session to `Failed`, if any.
    pub fn last_error(&self) -> Option<PipelineError> {
        self.shared.lock().error.clone()
    }

    /// Start a session. Transitions: idle → starting → running.
    ///
    /// A no-op when the controller is not idle. Invalid configurations fail
    /// with `UnsupportedConfiguration` and leave the controller idle; any
    /// acquisition failure releases what was built and moves to `Failed`.
    pub fn start(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        let current = self.state.load();
        if !current.is_idle() {
            log::debug!("start() ignored in state {}", current);
            return Ok(());
        }

        config.validate(&self.factory.capabilities())?;

        self.state.store(PipelineState::Starting);
        self.notify_state(PipelineState::Starting);

        let mut resources = SessionResources::default();
        if let Err(e) = self.acquire(&config, &mut resources) {
            return Err(self.fail_start(resources, e));
        }

        let started_at = Instant::now();
        let frame_bytes = config.frame_bytes();
        self.config = Some(config.clone());

        self.state.store(PipelineState::Running);
        self.notify_state(PipelineState::Running);

        let worker = EncodeWorker {
            frame: PcmFrame::with_capacity(frame_bytes),
            config,
            resources,
            state: Arc::clone(&self.state),
            shared: Arc::clone(&self.shared),
            delegate: self.delegate.clone(),
            started_at,
            stats: PipelineStats::default(),
            track: None,
            last_timestamp_us: 0,
            last_levels_at: None,
        };

        match thread::Builder::new()
            .name("audio-encode".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                log::info!("Recording started");
                Ok(())
            }
            Err(e) => {
                // The closure, and the resources inside it, were dropped with the failed spawn.
                let error = PipelineError::Internal(format!("failed to spawn worker: {}", e));
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    /// Stop the session and wait for the container to be finalized.
    ///
    /// Returns `Ok(None)` when nothing was started, `Ok(Some(result))` once
    /// stopped, and the stored error after a failure. Safe to call repeatedly.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, PipelineError> {
        match self.state.load() {
            PipelineState::Idle | PipelineState::Starting => {
                log::debug!("stop() ignored, no session running");
                return Ok(None);
            }
            PipelineState::Running => {
                // The worker announces Stopping itself once it leaves the loop.
                self.state.transition(PipelineState::Running, PipelineState::Stopping);
            }
            _ => {}
        }

        self.join_worker();

        let shared = self.shared.lock();
        match self.state.load() {
            PipelineState::Stopped => Ok(shared.result.clone()),
            _ => Err(shared
                .error
                .clone()
                .unwrap_or_else(|| PipelineError::Internal("session ended without an outcome".into()))),
        }
    }

    fn acquire(&self, config: &PipelineConfig, resources: &mut SessionResources) -> Result<(), PipelineError> {
        resources.capture = Some(self.factory.open_capture(config)?);

        let codec = resources.codec.insert(self.factory.create_codec(config)?);
        codec.configure(&CodecParams {
            codec: config.container_kind.codec(),
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            bitrate: config.target_bitrate,
            role: CodecRole::Encode,
        })?;
        codec.start()?;

        resources.sink = Some(self.factory.create_sink(config)?);
        Ok(())
    }

    fn fail_start(&self, mut resources: SessionResources, error: PipelineError) -> PipelineError {
        if let Err(release_err) = resources.release() {
            log::warn!("Teardown after failed start also failed: {}", release_err);
        }
        self.record_failure(&error);
        error
    }

    fn record_failure(&self, error: &PipelineError) {
        log::error!("Recording failed: {}", error);
        self.shared.lock().error = Some(error.clone());
        self.state.store(PipelineState::Failed);
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
            delegate.on_state_changed(PipelineState::Failed);
        }
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if handle.join().is_err() {
            self.record_failure(&PipelineError::Internal("encode worker panicked".into()));
        }
    }

    fn notify_state(&self, state: PipelineState) {
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }
}

impl<F: ComponentFactory> Drop for PipelineController<F> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.state.transition(PipelineState::Running, PipelineState::Stopping);
            self.join_worker();
        }
    }
}

/// Everything the `audio-encode` thread owns.
struct EncodeWorker {
    config: PipelineConfig,
    resources: SessionResources,
    state: Arc<AtomicPipelineState>,
    shared: Arc<Mutex<SharedStatus>>,
    delegate: Option<Arc<dyn PipelineDelegate>>,
    started_at: Instant,
    frame: PcmFrame,
    stats: PipelineStats,
    track: Option<TrackId>,
    last_timestamp_us: u64,
    last_levels_at: Option<Instant>,
}

impl EncodeWorker {
    fn run(mut self) {
        let mut first_error = self.run_loop().err();
        if first_error.is_none() && self.state.load() == PipelineState::Stopping {
            self.notify_state(PipelineState::Stopping);
        }

        match &first_error {
            None => {
                if let Err(e) = self.flush_end_of_stream() {
                    first_error = Some(e);
                }
            }
            Some(e) if e.is_capture() => {
                if let Err(flush_err) = self.flush_end_of_stream() {
                    log::warn!("Flush after capture failure failed: {}", flush_err);
                }
            }
            Some(_) => {}
        }

        if let Err(e) = self.resources.release() {
            match &first_error {
                None => first_error = Some(e),
                Some(root) => log::warn!("Teardown error after {}: {}", root, e),
            }
        }
        self.publish_stats();

        let outcome = match first_error {
            None => self.build_result(),
            Some(e) => Err(e),
        };
        match outcome {
            Ok(result) => self.finish(result),
            Err(e) => self.fail(e),
        }
    }

    fn run_loop(&mut self) -> Result<(), PipelineError> {
        while self.state.load() == PipelineState::Running {
            if let Some(limit) = self.config.max_duration {
                if self.started_at.elapsed() >= limit {
                    if self.state.transition(PipelineState::Running, PipelineState::Stopping) {
                        log::info!("Maximum duration of {:?} reached, stopping", limit);
                    }
                    break;
                }
            }

            let read = self.resources.capture()?.read(&mut self.frame).map_err(|e| match e {
                PipelineError::DeviceUnavailable(_) => e,
                other => PipelineError::DeviceUnavailable(other.to_string()),
            })?;
            self.frame.set_len(read);

            if self.frame.is_empty() {
                self.stats.empty_reads += 1;
            } else {
                self.stats.frames_read += 1;
                self.stats.bytes_read += self.frame.len() as u64;
                self.update_levels();
                self.submit_frame()?;
            }

            self.drain_output(self.config.timings.output_poll_timeout)?;
            self.publish_stats();
        }
        Ok(())
    }

    /// Hand the current frame to the codec, or drop it if no slot frees up in time.
    fn submit_frame(&mut self) -> Result<(), PipelineError> {
        let timeout = self.config.timings.input_slot_timeout;
        let timestamp_us = self.elapsed_us();
        let codec = self.resources.codec()?;

        let capacity = codec.input_capacity();
        let len = self.frame.len().min(capacity);
        if len < self.frame.len() {
            self.stats.bytes_truncated += (self.frame.len() - len) as u64;
        }

        match codec.try_submit_input(&self.frame.bytes()[..len], timestamp_us, false, timeout)? {
            SubmitOutcome::Accepted => self.stats.inputs_accepted += 1,
            SubmitOutcome::Busy => {
                self.stats.frames_dropped_busy += 1;
                log::debug!("Codec busy, dropped {} bytes at {} us", len, timestamp_us);
            }
        }
        Ok(())
    }

    /// Mux every unit the codec has ready. Returns true once end-of-stream was seen.
    fn drain_output(&mut self, first_wait: Duration) -> Result<bool, PipelineError> {
        let mut wait = first_wait;
        loop {
            let next = self.resources.codec()?.try_take_output(wait)?;
            let Some(unit) = next else {
                return Ok(false);
            };
            wait = Duration::ZERO;
            let end_of_stream = unit.is_end_of_stream();
            self.handle_unit(unit)?;
            if end_of_stream {
                return Ok(true);
            }
        }
    }

    fn handle_unit(&mut self, unit: AccessUnit) -> Result<(), PipelineError> {
        if unit.is_config() {
            self.stats.config_units += 1;
            if self.track.is_none() {
                self.register_track()?;
            } else {
                log::debug!("Ignoring repeated config unit");
            }
            return Ok(());
        }

        if unit.is_end_of_stream() {
            self.stats.end_of_stream_seen = true;
        }
        if unit.payload.is_empty() {
            // An empty end-of-stream unit marks where the audio really ends.
            if let Some(track) = self.track.filter(|_| unit.is_end_of_stream()) {
                let end_us = unit.timestamp_us.max(self.last_timestamp_us);
                self.resources.sink()?.set_end_timestamp(track, end_us)?;
            }
            return Ok(());
        }

        let Some(track) = self.track else {
            self.stats.units_dropped_unregistered += 1;
            log::warn!(
                "Dropping {}-byte unit at {} us, track not registered yet",
                unit.payload.len(),
                unit.timestamp_us
            );
            return Ok(());
        };

        let timestamp_us = unit.timestamp_us.max(self.last_timestamp_us);
        self.resources.sink()?.write_sample(track, &unit.payload, timestamp_us)?;
        self.last_timestamp_us = timestamp_us;
        self.stats.units_written += 1;
        self.stats.bytes_muxed += unit.payload.len() as u64;
        Ok(())
    }

    fn register_track(&mut self) -> Result<(), PipelineError> {
        let format = self
            .resources
            .codec()?
            .output_format()
            .ok_or_else(|| PipelineError::CodecError("config unit emitted before an output format".into()))?;
        let sink = self.resources.sink()?;
        let track = sink.add_track(&format)?;
        sink.start()?;
        log::info!(
            "Registered {} track ({} Hz, {} ch, {} bps)",
            format.mime(),
            format.sample_rate,
            format.channel_count,
            format.bitrate
        );
        self.track = Some(track);
        Ok(())
    }

    /// Signal end-of-stream and drain until the codec confirms it or goes quiet.
    fn flush_end_of_stream(&mut self) -> Result<(), PipelineError> {
        let timings = self.config.timings;
        let timestamp_us = self.elapsed_us();

        let mut submitted = false;
        for _ in 0..timings.eos_submit_attempts.max(1) {
            let outcome = self
                .resources
                .codec()?
                .try_submit_input(&[], timestamp_us, true, timings.input_slot_timeout)?;
            match outcome {
                SubmitOutcome::Accepted => {
                    submitted = true;
                    break;
                }
                SubmitOutcome::Busy => {
                    if self.drain_output(Duration::ZERO)? {
                        return Ok(());
                    }
                }
            }
        }
        if !submitted {
            log::warn!("No input slot for end-of-stream, draining anyway");
        }

        let mut empty_polls = 0;
        while empty_polls < timings.eos_max_empty_polls {
            let next = self.resources.codec()?.try_take_output(timings.eos_poll_timeout)?;
            match next {
                Some(unit) => {
                    empty_polls = 0;
                    let end_of_stream = unit.is_end_of_stream();
                    self.handle_unit(unit)?;
                    if end_of_stream {
                        return Ok(());
                    }
                }
                None => empty_polls += 1,
            }
        }
        log::warn!(
            "Codec never signalled end-of-stream after {} empty polls",
            timings.eos_max_empty_polls
        );
        Ok(())
    }

    fn build_result(&self) -> Result<RecordingResult, PipelineError> {
        let duration_secs = self.started_at.elapsed().as_secs_f64();
        let file_path = self.config.output_path.clone();
        let checksum = checksum::sha256_file(&file_path)?;
        let metadata = RecordingMetadata::new(&self.config, duration_secs, &checksum, self.stats.units_written);

        if self.config.write_metadata {
            if let Err(e) = metadata::write_metadata(&metadata, &file_path) {
                log::warn!("Recording kept, but its metadata sidecar failed: {}", e);
            }
        }

        Ok(RecordingResult {
            file_path,
            duration_secs,
            stats: self.stats,
            metadata,
            checksum,
        })
    }

    fn finish(&self, result: RecordingResult) {
        log::info!(
            "Recording stopped: {} ({:.2}s, {} units, {} busy drops)",
            result.file_path.display(),
            result.duration_secs,
            result.stats.units_written,
            result.stats.frames_dropped_busy
        );
        self.shared.lock().result = Some(result.clone());
        self.state.store(PipelineState::Stopped);
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(PipelineState::Stopped);
            delegate.on_recording_finished(&result);
        }
    }

    fn fail(&self, error: PipelineError) {
        log::error!("Recording failed: {}", error);
        self.shared.lock().error = Some(error.clone());
        self.state.store(PipelineState::Failed);
        if let Some(delegate) = &self.delegate {
            delegate.on_error(&error);
            delegate.on_state_changed(PipelineState::Failed);
        }
    }

    fn update_levels(&mut self) {
        let levels = pcm::levels(self.frame.bytes());
        self.shared.lock().levels = levels;

        let due = self.last_levels_at.map_or(true, |at| at.elapsed() >= LEVELS_INTERVAL);
        if due {
            if let Some(delegate) = &self.delegate {
                delegate.on_levels_updated(&levels);
            }
            self.last_levels_at = Some(Instant::now());
        }
    }

    fn publish_stats(&self) {
        self.shared.lock().stats = self.stats;
    }

    fn notify_state(&self, state: PipelineState) {
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn elapsed_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingCapture {
        closed: Arc<Mutex<usize>>,
    }

    impl CaptureSource for CountingCapture {
        fn read(&mut self, frame: &mut PcmFrame) -> Result<usize, PipelineError> {
            Ok(frame.capacity())
        }

        fn close(&mut self) {
            *self.closed.lock() += 1;
        }
    }

    #[test]
    fn resource_accessors_borrow_owned_handles() {
        let closed = Arc::new(Mutex::new(0));
        let mut resources = SessionResources {
            capture: Some(Box::new(CountingCapture {
                closed: Arc::clone(&closed),
            })),
            codec: None,
            sink: None,
        };
        let mut frame = PcmFrame::with_capacity(64);
        assert_eq!(resources.capture().unwrap().read(&mut frame).unwrap(), 64);
        assert!(matches!(resources.codec(), Err(PipelineError::Internal(_))));
        assert!(matches!(resources.sink(), Err(PipelineError::Internal(_))));

        resources.release().unwrap();
        resources.release().unwrap();
        assert_eq!(*closed.lock(), 1);
        assert!(resources.capture().is_err());
    }
}
