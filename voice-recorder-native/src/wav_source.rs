//! WAV file capture source.
//!
//! Plays a WAV file into the pipeline as if it were a microphone. In
//! real-time mode reads are paced to the file's sample rate, so the encoder
//! sees the same cadence a live device would produce.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavReader};

use voice_recorder_core::models::audio_models::PcmFrame;
use voice_recorder_core::models::config::PipelineConfig;
use voice_recorder_core::models::error::PipelineError;
use voice_recorder_core::processing::pcm;
use voice_recorder_core::traits::capture_source::CaptureSource;

pub struct WavFileSource {
    path: PathBuf,
    reader: Option<WavReader<BufReader<File>>>,
    channels: usize,
    sample_rate: u32,
    float_samples: bool,
    realtime: bool,
    read_timeout: Duration,
    started_at: Option<Instant>,
    delivered_samples: u64,
    exhausted: bool,
}

impl WavFileSource {
    /// Open `path` for a session described by `config`.
    ///
    /// The file must match the session sample rate; any channel count is
    /// downmixed to mono. Fails with `DeviceUnavailable`.
    pub fn open(path: impl Into<PathBuf>, config: &PipelineConfig, realtime: bool) -> Result<Self, PipelineError> {
        let path = path.into();
        let reader = WavReader::open(&path)
            .map_err(|e| PipelineError::DeviceUnavailable(format!("cannot open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        if spec.sample_rate != config.sample_rate {
            return Err(PipelineError::DeviceUnavailable(format!(
                "{} is {} Hz, session expects {} Hz",
                path.display(),
                spec.sample_rate,
                config.sample_rate
            )));
        }
        let float_samples = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => false,
            (SampleFormat::Float, 32) => true,
            (format, bits) => {
                return Err(PipelineError::DeviceUnavailable(format!(
                    "unsupported WAV sample format: {:?} {}-bit",
                    format, bits
                )))
            }
        };

        log::info!(
            "Opened {} ({} Hz, {} ch, {} frames)",
            path.display(),
            spec.sample_rate,
            spec.channels,
            reader.duration()
        );

        Ok(Self {
            path,
            reader: Some(reader),
            channels: spec.channels.max(1) as usize,
            sample_rate: spec.sample_rate,
            float_samples,
            realtime,
            read_timeout: config.timings.capture_read_timeout,
            started_at: None,
            delivered_samples: 0,
            exhausted: false,
        })
    }

    /// Playing time of a WAV file.
    pub fn duration_of(path: &Path) -> Result<Duration, PipelineError> {
        let reader = WavReader::open(path)
            .map_err(|e| PipelineError::DeviceUnavailable(format!("cannot open {}: {}", path.display(), e)))?;
        let rate = reader.spec().sample_rate.max(1) as f64;
        Ok(Duration::from_secs_f64(reader.duration() as f64 / rate))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Sleep until the next frame is due. Returns false if it is still not due
    /// after one read timeout.
    fn wait_for_cadence(&mut self) -> bool {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let due = Duration::from_secs_f64(self.delivered_samples as f64 / self.sample_rate as f64);
        let elapsed = started_at.elapsed();
        if elapsed >= due {
            return true;
        }
        let wait = due - elapsed;
        if wait > self.read_timeout {
            thread::sleep(self.read_timeout);
            return false;
        }
        thread::sleep(wait);
        true
    }

    fn read_mono(&mut self, frames: usize) -> Result<Vec<i16>, PipelineError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };
        let wanted = frames * self.channels;
        let interleaved: Vec<i16> = if self.float_samples {
            let floats = reader
                .samples::<f32>()
                .take(wanted)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PipelineError::DeviceUnavailable(format!("read failed: {}", e)))?;
            pcm::f32_to_i16(&floats)
        } else {
            reader
                .samples::<i16>()
                .take(wanted)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PipelineError::DeviceUnavailable(format!("read failed: {}", e)))?
        };
        Ok(pcm::downmix_to_mono(&interleaved, self.channels))
    }
}

impl CaptureSource for WavFileSource {
    fn read(&mut self, frame: &mut PcmFrame) -> Result<usize, PipelineError> {
        if self.exhausted {
            thread::sleep(self.read_timeout);
            return Ok(0);
        }
        if self.realtime && !self.wait_for_cadence() {
            return Ok(0);
        }

        let samples = self.read_mono(frame.capacity() / 2)?;
        if samples.is_empty() {
            log::info!("Reached end of {}", self.path.display());
            self.exhausted = true;
            return Ok(0);
        }

        let bytes = pcm::samples_to_bytes(&samples);
        frame.buffer_mut()[..bytes.len()].copy_from_slice(&bytes);
        self.delivered_samples += samples.len() as u64;
        Ok(bytes.len())
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!(
                "Closed {} after {} samples",
                self.path.display(),
                self.delivered_samples
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_recorder_core::models::config::ContainerKind;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new(ContainerKind::AacInMp4, "unused.m4a")
    }

    #[test]
    fn delivers_every_sample_then_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..1000).map(|i| (i * 7) as i16).collect();
        write_wav(&path, 16000, 1, &samples);

        let mut source = WavFileSource::open(&path, &config(), false).unwrap();
        let mut frame = PcmFrame::with_capacity(640);
        let mut collected = Vec::new();
        loop {
            let read = source.read(&mut frame).unwrap();
            if read == 0 {
                break;
            }
            frame.set_len(read);
            collected.extend(pcm::bytes_to_samples(frame.bytes()));
        }
        assert_eq!(collected, samples);
        assert!(source.is_exhausted());
        source.close();
        source.close();
    }

    #[test]
    fn stereo_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 16000, 2, &[100, 300, -200, -400]);

        let mut source = WavFileSource::open(&path, &config(), false).unwrap();
        let mut frame = PcmFrame::with_capacity(640);
        let read = source.read(&mut frame).unwrap();
        frame.set_len(read);
        assert_eq!(pcm::bytes_to_samples(frame.bytes()), vec![200, -300]);
    }

    #[test]
    fn rate_mismatch_is_device_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44100, 1, &[0; 10]);
        let err = WavFileSource::open(&path, &config(), false).err().unwrap();
        assert!(err.is_capture());
    }

    #[test]
    fn missing_file_is_device_unavailable() {
        let err = WavFileSource::open("/nonexistent/input.wav", &config(), false).err().unwrap();
        assert!(err.is_capture());
    }

    #[test]
    fn realtime_reads_follow_the_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paced.wav");
        write_wav(&path, 16000, 1, &vec![0; 16000]);

        let mut source = WavFileSource::open(&path, &config(), true).unwrap();
        let mut frame = PcmFrame::with_capacity(640);
        let start = Instant::now();
        let mut delivered = 0;
        while delivered < 5 * 640 {
            delivered += source.read(&mut frame).unwrap();
        }
        // Five 20 ms frames: the first is due immediately, the fifth at 80 ms.
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[test]
    fn duration_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.wav");
        write_wav(&path, 16000, 1, &vec![0; 8000]);
        assert_eq!(WavFileSource::duration_of(&path).unwrap(), Duration::from_millis(500));
    }
}
