//! AAC-LC encoder backed by an `ffmpeg` child process.
//!
//! ```text
//! try_submit_input → [bounded channel] → ffmpeg-stdin thread → ffmpeg
//!                                                                │ ADTS
//! try_take_output ← [channel] ← ffmpeg-stdout thread ←───────────┘
//! ```
//!
//! The stdout pump splits the ADTS stream into raw access units and emits
//! one config unit (the AudioSpecificConfig) ahead of the first frame.
//! Closing stdin makes ffmpeg flush; stdout EOF becomes the end-of-stream unit.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use voice_recorder_core::models::audio_models::{AccessUnit, SubmitOutcome};
use voice_recorder_core::models::error::PipelineError;
use voice_recorder_core::models::format::{AudioCodec, CodecParams, OutputFormat};
use voice_recorder_core::processing::adts::{self, AdtsFrameReader};
use voice_recorder_core::traits::codec_adapter::CodecAdapter;

/// Bytes one input slot carries.
const INPUT_SLOT_BYTES: usize = 16 * 1024;
/// Input slots queued ahead of the ffmpeg stdin writer.
const INPUT_SLOTS: usize = 8;
/// How long `stop` waits for ffmpeg to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(2);

enum InputMessage {
    Pcm(Vec<u8>),
    EndOfStream,
}

/// State the stdout pump shares with the adapter.
#[derive(Default)]
struct PumpShared {
    /// Timestamp of the first submitted input; units are stamped from here.
    base_timestamp_us: Option<u64>,
    output_format: Option<OutputFormat>,
}

pub struct FfmpegAacCodec {
    binary: PathBuf,
    params: Option<CodecParams>,
    child: Option<Child>,
    input_tx: Option<Sender<InputMessage>>,
    output_rx: Option<Receiver<Result<AccessUnit, PipelineError>>>,
    shared: Arc<Mutex<PumpShared>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl FfmpegAacCodec {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            params: None,
            child: None,
            input_tx: None,
            output_rx: None,
            shared: Arc::new(Mutex::new(PumpShared::default())),
            threads: Vec::new(),
        }
    }

    fn build_args(params: &CodecParams) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "s16le".into(),
            "-ar".into(),
            params.sample_rate.to_string(),
            "-ac".into(),
            params.channel_count.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            params.bitrate.to_string(),
            "-f".into(),
            "adts".into(),
            "pipe:1".into(),
        ]
    }

    fn spawn_thread(&mut self, name: &str, body: impl FnOnce() + Send + 'static) -> Result<(), PipelineError> {
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(body)
            .map_err(|e| PipelineError::CodecError(format!("failed to spawn {} thread: {}", name, e)))?;
        self.threads.push(handle);
        Ok(())
    }

    /// Wait for ffmpeg to exit, killing it after the grace period.
    fn reap_child(&mut self) -> Result<(), PipelineError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(PipelineError::CodecError(format!("ffmpeg exited with {}", status)));
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => {
                    log::warn!("ffmpeg did not exit in {:?}, killing it", EXIT_GRACE);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::CodecError("ffmpeg had to be killed".into()));
                }
                Err(e) => return Err(PipelineError::CodecError(format!("waiting for ffmpeg failed: {}", e))),
            }
        }
    }

    fn join_threads(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::warn!("ffmpeg pump thread panicked");
            }
        }
    }
}

impl Default for FfmpegAacCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecAdapter for FfmpegAacCodec {
    fn configure(&mut self, params: &CodecParams) -> Result<(), PipelineError> {
        if params.codec != AudioCodec::Aac {
            return Err(PipelineError::UnsupportedFormat(format!(
                "ffmpeg adapter only encodes AAC, not {}",
                params.codec.mime()
            )));
        }
        if adts::sampling_frequency_index(params.sample_rate).is_none() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "AAC has no sampling index for {} Hz",
                params.sample_rate
            )));
        }
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        let params = self
            .params
            .ok_or_else(|| PipelineError::CodecError("start before configure".into()))?;

        let mut child = Command::new(&self.binary)
            .args(Self::build_args(&params))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipelineError::UnsupportedFormat(format!("{} not found", self.binary.display()))
                } else {
                    PipelineError::CodecError(format!("failed to start ffmpeg: {}", e))
                }
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        self.child = Some(child);
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(PipelineError::CodecError("ffmpeg pipes unavailable".into()));
        };

        let (input_tx, input_rx) = bounded::<InputMessage>(INPUT_SLOTS);
        let (output_tx, output_rx) = unbounded();
        self.input_tx = Some(input_tx);
        self.output_rx = Some(output_rx);

        self.spawn_thread("ffmpeg-stdin", move || pump_stdin(stdin, input_rx))?;
        let shared = Arc::clone(&self.shared);
        self.spawn_thread("ffmpeg-stdout", move || pump_adts(stdout, params, shared, output_tx))?;

        log::info!(
            "Started ffmpeg AAC encoder ({} Hz, {} bps)",
            params.sample_rate,
            params.bitrate
        );
        Ok(())
    }

    fn input_capacity(&self) -> usize {
        INPUT_SLOT_BYTES
    }

    fn try_submit_input(
        &mut self,
        input: &[u8],
        timestamp_us: u64,
        end_of_stream: bool,
        timeout: Duration,
    ) -> Result<SubmitOutcome, PipelineError> {
        let Some(tx) = &self.input_tx else {
            return Err(PipelineError::CodecError("encoder not started".into()));
        };

        let message = if end_of_stream {
            InputMessage::EndOfStream
        } else {
            self.shared.lock().base_timestamp_us.get_or_insert(timestamp_us);
            InputMessage::Pcm(input.to_vec())
        };

        match tx.send_timeout(message, timeout) {
            Ok(()) => {
                if end_of_stream {
                    // No more input after end-of-stream.
                    self.input_tx = None;
                }
                Ok(SubmitOutcome::Accepted)
            }
            Err(SendTimeoutError::Timeout(_)) => Ok(SubmitOutcome::Busy),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(PipelineError::CodecError("ffmpeg stdin closed".into()))
            }
        }
    }

    fn try_take_output(&mut self, timeout: Duration) -> Result<Option<AccessUnit>, PipelineError> {
        let Some(rx) = &self.output_rx else {
            return Ok(None);
        };
        match rx.recv_timeout(timeout) {
            Ok(unit) => unit.map(Some),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.shared.lock().output_format.clone()
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        // Dropping the sender lets the stdin pump close ffmpeg's input.
        self.input_tx = None;
        let outcome = self.reap_child();
        self.join_threads();
        outcome
    }

    fn release(&mut self) {
        self.input_tx = None;
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
        }
        if let Err(e) = self.reap_child() {
            log::debug!("ffmpeg release: {}", e);
        }
        self.join_threads();
        self.output_rx = None;
    }
}

impl Drop for FfmpegAacCodec {
    fn drop(&mut self) {
        self.release();
    }
}

fn pump_stdin(mut stdin: ChildStdin, input_rx: Receiver<InputMessage>) {
    for message in input_rx.iter() {
        match message {
            InputMessage::Pcm(data) => {
                if let Err(e) = stdin.write_all(&data) {
                    log::warn!("Writing to ffmpeg failed: {}", e);
                    return;
                }
            }
            InputMessage::EndOfStream => break,
        }
    }
    // stdin drops here, which closes the pipe and lets ffmpeg flush.
}

/// Split an ADTS byte stream into access units.
///
/// Sends a config unit before the first frame and an end-of-stream unit at EOF.
fn pump_adts<R: Read>(
    mut stdout: R,
    params: CodecParams,
    shared: Arc<Mutex<PumpShared>>,
    output_tx: Sender<Result<AccessUnit, PipelineError>>,
) {
    let mut reader = AdtsFrameReader::new();
    let mut chunk = vec![0u8; 8192];
    let mut frames: u64 = 0;
    let mut end_timestamp_us = 0;

    loop {
        let read = match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = output_tx.send(Err(PipelineError::CodecError(format!("reading ffmpeg output failed: {}", e))));
                return;
            }
        };
        reader.push(&chunk[..read]);

        while let Some((header, payload)) = reader.next_frame() {
            if frames == 0 {
                let asc = header.audio_specific_config();
                shared.lock().output_format = Some(OutputFormat {
                    codec: AudioCodec::Aac,
                    sample_rate: header.sample_rate(),
                    channel_count: params.channel_count,
                    bitrate: params.bitrate,
                    codec_specific_data: asc.to_vec(),
                    samples_per_unit: adts::AAC_SAMPLES_PER_FRAME,
                });
                if output_tx.send(Ok(AccessUnit::config(asc.to_vec()))).is_err() {
                    return;
                }
            }
            let base = shared.lock().base_timestamp_us.unwrap_or(0);
            let rate = header.sample_rate().max(1) as u64;
            let timestamp_us = base + frames * adts::AAC_SAMPLES_PER_FRAME as u64 * 1_000_000 / rate;
            frames += 1;
            end_timestamp_us = base + frames * adts::AAC_SAMPLES_PER_FRAME as u64 * 1_000_000 / rate;
            if output_tx.send(Ok(AccessUnit::data(payload, timestamp_us))).is_err() {
                return;
            }
        }
    }

    if reader.skipped() > 0 {
        log::warn!("Skipped {} bytes of non-ADTS output", reader.skipped());
    }
    log::debug!("ffmpeg output ended after {} AAC frames", frames);
    let _ = output_tx.send(Ok(AccessUnit::end_of_stream(Vec::new(), end_timestamp_us)));
}
