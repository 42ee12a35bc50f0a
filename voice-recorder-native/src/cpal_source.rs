//! Default-microphone capture through cpal.
//!
//! cpal streams are not `Send`, so the stream is built, played and dropped on
//! a dedicated thread. Its callback downmixes into a shared ring buffer that
//! `read` drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex};

use voice_recorder_core::models::audio_models::PcmFrame;
use voice_recorder_core::models::config::PipelineConfig;
use voice_recorder_core::models::error::PipelineError;
use voice_recorder_core::processing::pcm;
use voice_recorder_core::processing::ring_buffer::RingBuffer;
use voice_recorder_core::traits::capture_source::CaptureSource;

const BUFFER_SECONDS: usize = 2;
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    buffer: Mutex<RingBuffer<i16>>,
    data_ready: Condvar,
    stream_error: Mutex<Option<String>>,
}

impl Shared {
    fn push(&self, interleaved: &[i16], channels: usize) {
        let mono = pcm::downmix_to_mono(interleaved, channels);
        self.buffer.lock().write(&mono);
        self.data_ready.notify_one();
    }
}

pub struct CpalMicSource {
    device_name: String,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
    read_timeout: Duration,
}

impl CpalMicSource {
    /// Open the system default input device at `config.sample_rate`.
    pub fn open_default(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(RingBuffer::new(config.sample_rate as usize * BUFFER_SECONDS)),
            data_ready: Condvar::new(),
            stream_error: Mutex::new(None),
        });
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<String, PipelineError>>(1);

        let thread_shared = Arc::clone(&shared);
        let thread_running = Arc::clone(&running);
        let sample_rate = config.sample_rate;
        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || match build_stream(sample_rate, Arc::clone(&thread_shared)) {
                Ok((stream, name)) => {
                    let _ = ready_tx.send(Ok(name));
                    while thread_running.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(10));
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| PipelineError::Internal(format!("failed to spawn capture thread: {}", e)))?;

        let opened = ready_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or_else(|_| Err(PipelineError::DeviceUnavailable("input device did not open in time".into())));
        match opened {
            Ok(device_name) => {
                log::info!("Microphone capture started on {} at {} Hz", device_name, sample_rate);
                Ok(Self {
                    device_name,
                    shared,
                    running,
                    capture_handle: Some(handle),
                    read_timeout: config.timings.capture_read_timeout,
                })
            }
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Build and play an input stream on the calling thread.
fn build_stream(sample_rate: u32, shared: Arc<Shared>) -> Result<(cpal::Stream, String), PipelineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| PipelineError::DeviceUnavailable("no default input device".into()))?;
    let name = device.name().unwrap_or_else(|_| "default input".into());

    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| PipelineError::DeviceUnavailable(format!("cannot query {}: {}", name, e)))?
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
        })
        .collect();
    // Prefer native 16-bit, then float.
    let supported = ranges
        .iter()
        .find(|r| r.sample_format() == cpal::SampleFormat::I16)
        .or_else(|| ranges.iter().find(|r| r.sample_format() == cpal::SampleFormat::F32))
        .ok_or_else(|| {
            PipelineError::DeviceUnavailable(format!("{} cannot capture at {} Hz", name, sample_rate))
        })?
        .clone()
        .with_sample_rate(cpal::SampleRate(sample_rate));

    let channels = supported.channels() as usize;
    let stream_config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let error_shared = Arc::clone(&shared);
    let on_error = move |e: cpal::StreamError| {
        log::error!("Input stream error: {}", e);
        *error_shared.stream_error.lock() = Some(e.to_string());
        error_shared.data_ready.notify_one();
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| shared.push(data, channels),
            on_error,
            None,
        ),
        _ => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| shared.push(&pcm::f32_to_i16(data), channels),
            on_error,
            None,
        ),
    }
    .map_err(|e| PipelineError::DeviceUnavailable(format!("cannot open {}: {}", name, e)))?;

    stream
        .play()
        .map_err(|e| PipelineError::DeviceUnavailable(format!("cannot start {}: {}", name, e)))?;
    Ok((stream, name))
}

impl CaptureSource for CpalMicSource {
    fn read(&mut self, frame: &mut PcmFrame) -> Result<usize, PipelineError> {
        if let Some(message) = self.shared.stream_error.lock().clone() {
            return Err(PipelineError::DeviceUnavailable(message));
        }

        let mut buffer = self.shared.buffer.lock();
        if buffer.is_empty() {
            self.shared.data_ready.wait_for(&mut buffer, self.read_timeout);
        }
        let mut samples = vec![0i16; (frame.capacity() / 2).min(buffer.count())];
        let read = buffer.read_into(&mut samples);
        drop(buffer);

        let bytes = pcm::samples_to_bytes(&samples[..read]);
        frame.buffer_mut()[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
            let overflowed = self.shared.buffer.lock().overflowed();
            if overflowed > 0 {
                log::warn!("Microphone buffer overflowed, {} samples lost", overflowed);
            }
            log::info!("Microphone capture stopped on {}", self.device_name);
        }
    }
}

impl Drop for CpalMicSource {
    fn drop(&mut self) {
        self.close();
    }
}
