//! In-process Opus encoder (libopus through the `opus` crate).
//!
//! Encoding is synchronous: each submission is buffered and every complete
//! 20 ms frame is encoded on the spot, so output is ready as soon as the
//! call returns.

use std::collections::VecDeque;
use std::time::Duration;

use voice_recorder_core::models::audio_models::{AccessUnit, SubmitOutcome};
use voice_recorder_core::models::config::OPUS_SAMPLE_RATES;
use voice_recorder_core::models::error::PipelineError;
use voice_recorder_core::models::format::{AudioCodec, CodecParams, OutputFormat};
use voice_recorder_core::processing::opus_header::{opus_head, DEFAULT_PRE_SKIP};
use voice_recorder_core::processing::pcm;
use voice_recorder_core::processing::ring_buffer::RingBuffer;
use voice_recorder_core::traits::codec_adapter::CodecAdapter;

/// Largest packet libopus can produce.
const MAX_PACKET_BYTES: usize = 4000;
/// Frames of input the encoder buffers before reporting busy.
const BUFFERED_FRAMES: usize = 8;

pub struct OpusCodec {
    params: Option<CodecParams>,
    encoder: Option<opus::Encoder>,
    /// Samples per 20 ms frame.
    frame_samples: usize,
    pending: RingBuffer<i16>,
    output: VecDeque<AccessUnit>,
    base_timestamp_us: Option<u64>,
    frames_encoded: u64,
    started: bool,
    finished: bool,
}

impl OpusCodec {
    pub fn new() -> Self {
        Self {
            params: None,
            encoder: None,
            frame_samples: 0,
            pending: RingBuffer::new(1),
            output: VecDeque::new(),
            base_timestamp_us: None,
            frames_encoded: 0,
            started: false,
            finished: false,
        }
    }

    /// Timestamp `extra_samples` past the start of the next frame.
    fn timestamp_after(&self, extra_samples: usize) -> u64 {
        let rate = self.params.map_or(1, |p| p.sample_rate.max(1)) as u64;
        let samples = self.frames_encoded * self.frame_samples as u64 + extra_samples as u64;
        self.base_timestamp_us.unwrap_or(0) + samples * 1_000_000 / rate
    }

    fn frame_timestamp_us(&self) -> u64 {
        self.timestamp_after(0)
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<Vec<u8>, PipelineError> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| PipelineError::CodecError("encoder not configured".into()))?;
        let mut packet = vec![0u8; MAX_PACKET_BYTES];
        let len = encoder
            .encode(frame, &mut packet)
            .map_err(|e| PipelineError::CodecError(format!("opus encode failed: {}", e)))?;
        packet.truncate(len);
        Ok(packet)
    }

    fn encode_ready_frames(&mut self) -> Result<(), PipelineError> {
        let mut frame = vec![0i16; self.frame_samples];
        while self.pending.count() >= self.frame_samples {
            self.pending.read_into(&mut frame);
            let packet = self.encode_frame(&frame)?;
            let timestamp_us = self.frame_timestamp_us();
            self.output.push_back(AccessUnit::data(packet, timestamp_us));
            self.frames_encoded += 1;
        }
        Ok(())
    }

    /// Encode the zero-padded remainder, then emit an empty end-of-stream
    /// unit stamped where the real audio stops.
    fn finish(&mut self) -> Result<(), PipelineError> {
        let remainder = self.pending.count();
        let end_timestamp_us = self.timestamp_after(remainder);
        if remainder > 0 {
            let mut frame = vec![0i16; self.frame_samples];
            self.pending.read_into(&mut frame[..remainder]);
            let packet = self.encode_frame(&frame)?;
            let timestamp_us = self.frame_timestamp_us();
            self.output.push_back(AccessUnit::data(packet, timestamp_us));
            self.frames_encoded += 1;
        }
        self.output.push_back(AccessUnit::end_of_stream(Vec::new(), end_timestamp_us));
        self.finished = true;
        Ok(())
    }
}

impl Default for OpusCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecAdapter for OpusCodec {
    fn configure(&mut self, params: &CodecParams) -> Result<(), PipelineError> {
        if params.codec != AudioCodec::Opus {
            return Err(PipelineError::UnsupportedFormat(format!(
                "opus adapter cannot encode {}",
                params.codec.mime()
            )));
        }
        if !OPUS_SAMPLE_RATES.contains(&params.sample_rate) {
            return Err(PipelineError::UnsupportedFormat(format!(
                "opus cannot encode at {} Hz",
                params.sample_rate
            )));
        }
        let channels = match params.channel_count {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            n => return Err(PipelineError::UnsupportedFormat(format!("{} channels", n))),
        };

        let mut encoder = opus::Encoder::new(params.sample_rate, channels, opus::Application::Voip)
            .map_err(|e| PipelineError::UnsupportedFormat(format!("opus encoder init failed: {}", e)))?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(params.bitrate as i32))
            .map_err(|e| PipelineError::UnsupportedFormat(format!("bitrate {} rejected: {}", params.bitrate, e)))?;

        self.frame_samples = (params.sample_rate / 50) as usize;
        self.pending = RingBuffer::new(self.frame_samples * BUFFERED_FRAMES);
        self.encoder = Some(encoder);
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        let params = self
            .params
            .ok_or_else(|| PipelineError::CodecError("start before configure".into()))?;
        if !self.started {
            let head = opus_head(params.channel_count as u8, DEFAULT_PRE_SKIP, params.sample_rate);
            self.output.push_back(AccessUnit::config(head));
            self.started = true;
        }
        Ok(())
    }

    fn input_capacity(&self) -> usize {
        self.frame_samples * (BUFFERED_FRAMES / 2) * 2
    }

    fn try_submit_input(
        &mut self,
        input: &[u8],
        timestamp_us: u64,
        end_of_stream: bool,
        _timeout: Duration,
    ) -> Result<SubmitOutcome, PipelineError> {
        if !self.started || self.finished {
            return Err(PipelineError::CodecError("submit outside the running state".into()));
        }
        if end_of_stream {
            self.finish()?;
            return Ok(SubmitOutcome::Accepted);
        }

        let samples = pcm::bytes_to_samples(input);
        if samples.len() > self.pending.free() {
            return Ok(SubmitOutcome::Busy);
        }
        self.base_timestamp_us.get_or_insert(timestamp_us);
        self.pending.write(&samples);
        self.encode_ready_frames()?;
        Ok(SubmitOutcome::Accepted)
    }

    fn try_take_output(&mut self, _timeout: Duration) -> Result<Option<AccessUnit>, PipelineError> {
        Ok(self.output.pop_front())
    }

    fn output_format(&self) -> Option<OutputFormat> {
        let params = self.params?;
        self.started.then(|| OutputFormat {
            codec: AudioCodec::Opus,
            sample_rate: params.sample_rate,
            channel_count: params.channel_count,
            bitrate: params.bitrate,
            codec_specific_data: opus_head(params.channel_count as u8, DEFAULT_PRE_SKIP, params.sample_rate),
            samples_per_unit: self.frame_samples as u32,
        })
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        self.started = false;
        Ok(())
    }

    fn release(&mut self) {
        self.encoder = None;
        self.output.clear();
        self.pending.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_recorder_core::models::format::CodecRole;
    use voice_recorder_core::processing::opus_header::parse_opus_head;

    fn params() -> CodecParams {
        CodecParams {
            codec: AudioCodec::Opus,
            sample_rate: 16000,
            channel_count: 1,
            bitrate: 24000,
            role: CodecRole::Encode,
        }
    }

    fn drain(codec: &mut OpusCodec) -> Vec<AccessUnit> {
        let mut units = Vec::new();
        while let Some(unit) = codec.try_take_output(Duration::ZERO).unwrap() {
            units.push(unit);
        }
        units
    }

    #[test]
    fn second_of_silence_is_fifty_packets() {
        let mut codec = OpusCodec::new();
        codec.configure(&params()).unwrap();
        codec.start().unwrap();

        let silence = vec![0u8; 640];
        for i in 0..50u64 {
            let outcome = codec.try_submit_input(&silence, i * 20_000, false, Duration::ZERO).unwrap();
            assert_eq!(outcome, SubmitOutcome::Accepted);
        }
        codec.try_submit_input(&[], 1_000_000, true, Duration::ZERO).unwrap();

        let units = drain(&mut codec);
        assert!(units[0].is_config());
        assert_eq!(parse_opus_head(&units[0].payload).unwrap().input_sample_rate, 16000);
        let data: Vec<_> = units.iter().filter(|u| !u.is_config()).collect();
        assert_eq!(data.iter().filter(|u| !u.payload.is_empty()).count(), 50);
        let eos = data.last().unwrap();
        assert!(eos.is_end_of_stream());
        assert_eq!(eos.timestamp_us, 1_000_000);
        assert!(data.windows(2).all(|w| w[0].timestamp_us <= w[1].timestamp_us));
        assert_eq!(codec.output_format().unwrap().samples_per_unit, 320);
    }

    #[test]
    fn partial_frame_is_padded_at_end_of_stream() {
        let mut codec = OpusCodec::new();
        codec.configure(&params()).unwrap();
        codec.start().unwrap();
        codec.try_submit_input(&[0u8; 100], 0, false, Duration::ZERO).unwrap();
        codec.try_submit_input(&[], 0, true, Duration::ZERO).unwrap();

        let units = drain(&mut codec);
        let (last, padded) = (&units[units.len() - 1], &units[units.len() - 2]);
        assert!(!padded.payload.is_empty());
        assert!(!padded.is_end_of_stream());
        assert!(last.is_end_of_stream());
        assert!(last.payload.is_empty());
        // 50 samples at 16 kHz.
        assert_eq!(last.timestamp_us, 3_125);
    }

    #[test]
    fn rejects_aac_and_odd_rates() {
        let mut codec = OpusCodec::new();
        let mut p = params();
        p.codec = AudioCodec::Aac;
        assert!(matches!(codec.configure(&p), Err(PipelineError::UnsupportedFormat(_))));
        let mut p = params();
        p.sample_rate = 44100;
        assert!(codec.configure(&p).is_err());
    }

    #[test]
    fn full_buffer_reports_busy() {
        let mut codec = OpusCodec::new();
        codec.configure(&params()).unwrap();
        codec.start().unwrap();
        // More than the whole buffer at once can never fit.
        let oversized = vec![0u8; 320 * BUFFERED_FRAMES * 2 + 2];
        let outcome = codec.try_submit_input(&oversized, 0, false, Duration::ZERO).unwrap();
        assert_eq!(outcome, SubmitOutcome::Busy);
    }
}
