//! Fault-injecting fakes for the three pipeline adapters.
//!
//! Every fake reports into a shared `CallLog` so tests can assert call
//! counts and ordering after the session ends.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use voice_recorder_core::{
    AccessUnit, AudioCodec, AudioLevels, CaptureSource, CodecAdapter, CodecParams, ComponentFactory, ContainerSink,
    OutputFormat, PcmFrame, PipelineConfig, PipelineDelegate, PipelineError, PipelineState, PlatformCapabilities,
    RecordingResult, SubmitOutcome, TrackId,
};

#[derive(Debug, Default)]
pub struct Calls {
    pub capture_opened: u32,
    pub capture_reads: u64,
    pub capture_closed: u32,

    pub codec_created: u32,
    pub codec_configured: u32,
    pub codec_started: u32,
    pub codec_stopped: u32,
    pub codec_released: u32,
    pub inputs_accepted: u64,
    pub inputs_busy: u64,
    pub eos_submitted: u32,

    pub sink_created: u32,
    pub add_track: u32,
    pub sink_started: u32,
    pub writes: u64,
    pub finalized: u32,
    pub sink_released: u32,
    pub written_timestamps: Vec<u64>,
    pub end_timestamps: Vec<u64>,
    pub write_before_start: bool,
}

pub type CallLog = Arc<Mutex<Calls>>;

#[derive(Debug, Clone)]
pub struct CaptureBehavior {
    pub frames: usize,
    pub frame_len: usize,
    pub cadence: Duration,
    pub open_fails: bool,
    /// Fail the read after this many frames were delivered.
    pub fail_after: Option<usize>,
}

impl Default for CaptureBehavior {
    fn default() -> Self {
        Self {
            frames: 50,
            frame_len: 320,
            cadence: Duration::from_millis(2),
            open_fails: false,
            fail_after: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodecBehavior {
    pub fail_configure: Option<PipelineError>,
    /// Fail `try_submit_input` once this many inputs were accepted.
    pub fail_submit_after: Option<u64>,
    /// Report `Busy` on every n-th submission.
    pub busy_every: Option<u64>,
    pub stop_error: bool,
    pub no_end_of_stream: bool,
    /// Emit the first data unit ahead of the config unit.
    pub data_before_config: bool,
    /// Stamp every other data unit earlier than the previous one.
    pub backwards_timestamps: bool,
    pub input_capacity: Option<usize>,
    /// Queue the config unit on `start`, as an encoder with a fixed header does.
    pub config_on_start: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SinkBehavior {
    pub fail_finalize: bool,
    /// Use the crate's real file-backed sink instead of the fake.
    pub real_sink: bool,
}

#[derive(Debug, Clone)]
pub struct FactoryBehavior {
    pub platform_level: u32,
    pub capture: CaptureBehavior,
    pub codec: CodecBehavior,
    pub sink: SinkBehavior,
}

impl Default for FactoryBehavior {
    fn default() -> Self {
        Self {
            platform_level: 29,
            capture: CaptureBehavior::default(),
            codec: CodecBehavior::default(),
            sink: SinkBehavior::default(),
        }
    }
}

pub struct FakeFactory {
    pub calls_log: CallLog,
    pub behavior: FactoryBehavior,
}

impl FakeFactory {
    pub fn new(behavior: FactoryBehavior) -> Self {
        Self {
            calls_log: CallLog::default(),
            behavior,
        }
    }

    pub fn calls(&self) -> parking_lot::MutexGuard<'_, Calls> {
        self.calls_log.lock()
    }
}

impl ComponentFactory for FakeFactory {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::new(self.behavior.platform_level)
    }

    fn open_capture(&self, _config: &PipelineConfig) -> Result<Box<dyn CaptureSource>, PipelineError> {
        self.calls_log.lock().capture_opened += 1;
        if self.behavior.capture.open_fails {
            return Err(PipelineError::DeviceUnavailable("permission denied".into()));
        }
        Ok(Box::new(FakeCapture {
            calls_log: Arc::clone(&self.calls_log),
            behavior: self.behavior.capture.clone(),
            delivered: 0,
        }))
    }

    fn create_codec(&self, _config: &PipelineConfig) -> Result<Box<dyn CodecAdapter>, PipelineError> {
        self.calls_log.lock().codec_created += 1;
        Ok(Box::new(FakeCodec {
            calls_log: Arc::clone(&self.calls_log),
            behavior: self.behavior.codec.clone(),
            params: None,
            pending: VecDeque::new(),
            submissions: 0,
            accepted: 0,
            config_emitted: false,
        }))
    }

    fn create_sink(&self, config: &PipelineConfig) -> Result<Box<dyn ContainerSink>, PipelineError> {
        self.calls_log.lock().sink_created += 1;
        let inner = if self.behavior.sink.real_sink {
            Some(voice_recorder_core::storage::create_sink(config)?)
        } else {
            fs::write(&config.output_path, b"").map_err(|e| PipelineError::SinkError(e.to_string()))?;
            None
        };
        Ok(Box::new(FakeSink {
            calls_log: Arc::clone(&self.calls_log),
            behavior: self.behavior.sink.clone(),
            path: config.output_path.clone(),
            inner,
            started: false,
        }))
    }
}

pub struct FakeCapture {
    calls_log: CallLog,
    behavior: CaptureBehavior,
    delivered: usize,
}

impl CaptureSource for FakeCapture {
    fn read(&mut self, frame: &mut PcmFrame) -> Result<usize, PipelineError> {
        self.calls_log.lock().capture_reads += 1;
        thread::sleep(self.behavior.cadence);
        if self.behavior.fail_after.is_some_and(|n| self.delivered >= n) {
            return Err(PipelineError::DeviceUnavailable("device unplugged".into()));
        }
        if self.delivered >= self.behavior.frames {
            return Ok(0);
        }
        let len = self.behavior.frame_len.min(frame.capacity());
        for (i, byte) in frame.buffer_mut()[..len].iter_mut().enumerate() {
            *byte = (i + self.delivered) as u8;
        }
        self.delivered += 1;
        Ok(len)
    }

    fn close(&mut self) {
        self.calls_log.lock().capture_closed += 1;
    }
}

/// Echoes one data unit per two accepted inputs, preceded by one config unit.
pub struct FakeCodec {
    calls_log: CallLog,
    behavior: CodecBehavior,
    params: Option<CodecParams>,
    pending: VecDeque<AccessUnit>,
    submissions: u64,
    accepted: u64,
    config_emitted: bool,
}

impl FakeCodec {
    fn data_unit(&self, timestamp_us: u64) -> AccessUnit {
        let timestamp_us = if self.behavior.backwards_timestamps && (self.accepted / 2) % 2 == 0 {
            timestamp_us.saturating_sub(50_000)
        } else {
            timestamp_us
        };
        AccessUnit::data(vec![0xAB; 64], timestamp_us)
    }
}

impl CodecAdapter for FakeCodec {
    fn configure(&mut self, params: &CodecParams) -> Result<(), PipelineError> {
        self.calls_log.lock().codec_configured += 1;
        if let Some(err) = &self.behavior.fail_configure {
            return Err(err.clone());
        }
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        self.calls_log.lock().codec_started += 1;
        if self.behavior.config_on_start && !self.config_emitted {
            self.pending.push_back(AccessUnit::config(vec![0x14, 0x08]));
            self.config_emitted = true;
        }
        Ok(())
    }

    fn input_capacity(&self) -> usize {
        self.behavior.input_capacity.unwrap_or(4096)
    }

    fn try_submit_input(
        &mut self,
        input: &[u8],
        timestamp_us: u64,
        end_of_stream: bool,
        _timeout: Duration,
    ) -> Result<SubmitOutcome, PipelineError> {
        assert!(input.len() <= self.input_capacity(), "input exceeds slot capacity");
        self.submissions += 1;

        if end_of_stream {
            self.calls_log.lock().eos_submitted += 1;
            if !self.behavior.no_end_of_stream {
                self.pending.push_back(AccessUnit::end_of_stream(Vec::new(), timestamp_us));
            }
            return Ok(SubmitOutcome::Accepted);
        }
        if self.behavior.busy_every.is_some_and(|n| self.submissions % n == 0) {
            self.calls_log.lock().inputs_busy += 1;
            return Ok(SubmitOutcome::Busy);
        }
        if self.behavior.fail_submit_after.is_some_and(|n| self.accepted >= n) {
            return Err(PipelineError::CodecError("encoder crashed".into()));
        }

        self.accepted += 1;
        self.calls_log.lock().inputs_accepted += 1;

        if self.behavior.data_before_config && !self.config_emitted {
            let early = self.data_unit(timestamp_us);
            self.pending.push_back(early);
        }
        if !self.config_emitted {
            self.pending.push_back(AccessUnit::config(vec![0x14, 0x08]));
            self.config_emitted = true;
        }
        if self.accepted % 2 == 0 {
            let unit = self.data_unit(timestamp_us);
            self.pending.push_back(unit);
        }
        Ok(SubmitOutcome::Accepted)
    }

    fn try_take_output(&mut self, _timeout: Duration) -> Result<Option<AccessUnit>, PipelineError> {
        Ok(self.pending.pop_front())
    }

    fn output_format(&self) -> Option<OutputFormat> {
        let params = self.params?;
        self.config_emitted.then(|| OutputFormat {
            codec: params.codec,
            sample_rate: params.sample_rate,
            channel_count: params.channel_count,
            bitrate: params.bitrate,
            codec_specific_data: match params.codec {
                AudioCodec::Aac => vec![0x14, 0x08],
                AudioCodec::Opus => Vec::new(),
            },
            samples_per_unit: match params.codec {
                AudioCodec::Aac => 1024,
                AudioCodec::Opus => params.sample_rate / 50,
            },
        })
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        self.calls_log.lock().codec_stopped += 1;
        if self.behavior.stop_error {
            return Err(PipelineError::CodecError("stop on broken codec".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.calls_log.lock().codec_released += 1;
    }
}

/// Records every call; optionally forwards to a real file-backed sink.
pub struct FakeSink {
    calls_log: CallLog,
    behavior: SinkBehavior,
    path: PathBuf,
    inner: Option<Box<dyn ContainerSink>>,
    started: bool,
}

impl ContainerSink for FakeSink {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackId, PipelineError> {
        self.calls_log.lock().add_track += 1;
        match &mut self.inner {
            Some(inner) => inner.add_track(format),
            None => Ok(TrackId(7)),
        }
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        self.calls_log.lock().sink_started += 1;
        self.started = true;
        match &mut self.inner {
            Some(inner) => inner.start(),
            None => Ok(()),
        }
    }

    fn write_sample(&mut self, track: TrackId, payload: &[u8], timestamp_us: u64) -> Result<(), PipelineError> {
        {
            let mut calls = self.calls_log.lock();
            if !self.started {
                calls.write_before_start = true;
                return Err(PipelineError::SinkError("write before start".into()));
            }
            calls.writes += 1;
            calls.written_timestamps.push(timestamp_us);
        }
        match &mut self.inner {
            Some(inner) => inner.write_sample(track, payload, timestamp_us),
            None => Ok(()),
        }
    }

    fn set_end_timestamp(&mut self, track: TrackId, timestamp_us: u64) -> Result<(), PipelineError> {
        self.calls_log.lock().end_timestamps.push(timestamp_us);
        match &mut self.inner {
            Some(inner) => inner.set_end_timestamp(track, timestamp_us),
            None => Ok(()),
        }
    }

    fn finalize(&mut self) -> Result<(), PipelineError> {
        let writes = {
            let mut calls = self.calls_log.lock();
            calls.finalized += 1;
            calls.writes
        };
        if self.behavior.fail_finalize {
            return Err(PipelineError::SinkError("disk full".into()));
        }
        match &mut self.inner {
            Some(inner) => inner.finalize(),
            None => fs::write(&self.path, format!("fake container, {} samples", writes))
                .map_err(|e| PipelineError::SinkError(e.to_string())),
        }
    }

    fn release(&mut self) {
        self.calls_log.lock().sink_released += 1;
        if let Some(inner) = &mut self.inner {
            inner.release();
        }
    }
}

/// Delegate that records every notification.
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<PipelineState>>,
    pub errors: Mutex<Vec<PipelineError>>,
    pub levels: Mutex<Vec<AudioLevels>>,
    pub finished: Mutex<Vec<RecordingResult>>,
}

impl PipelineDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: PipelineState) {
        self.states.lock().push(state);
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        self.levels.lock().push(*levels);
    }

    fn on_error(&self, error: &PipelineError) {
        self.errors.lock().push(error.clone());
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
