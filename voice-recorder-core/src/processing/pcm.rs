//! Helpers for 16-bit little-endian mono PCM.

use crate::models::audio_models::AudioLevels;

/// Decode little-endian 16-bit samples. A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Convert f32 samples in `[-1.0, 1.0]` to i16, clamping out-of-range values.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// RMS and peak level of a PCM16 byte buffer, normalized to 0.0–1.0.
pub fn levels(bytes: &[u8]) -> AudioLevels {
    let mut count = 0usize;
    let mut sum_squares = 0f64;
    let mut peak = 0f32;
    for pair in bytes.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0;
        sum_squares += (sample * sample) as f64;
        peak = peak.max(sample.abs());
        count += 1;
    }
    if count == 0 {
        return AudioLevels::default();
    }
    AudioLevels {
        rms: (sum_squares / count as f64).sqrt() as f32,
        peak,
    }
}
