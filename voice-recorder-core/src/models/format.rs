use serde::{Deserialize, Serialize};

/// Compressed audio codecs the pipeline can mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Aac => "audio/mp4a-latm",
            Self::Opus => "audio/opus",
        }
    }
}

/// Direction a codec is configured for. The recorder only ever encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecRole {
    Encode,
}

/// Parameters handed to `CodecAdapter::configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    pub role: CodecRole,
}

/// Encoder output format, known only once the codec has emitted its config unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    /// AAC `AudioSpecificConfig`, or the Opus `OpusHead` packet.
    pub codec_specific_data: Vec<u8>,
    /// Samples covered by one access unit (1024 for AAC-LC).
    pub samples_per_unit: u32,
}

impl OutputFormat {
    pub fn mime(&self) -> &'static str {
        self.codec.mime()
    }

    /// Duration of one access unit in microseconds.
    pub fn unit_duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples_per_unit as u64 * 1_000_000 / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aac_unit_duration() {
        let format = OutputFormat {
            codec: AudioCodec::Aac,
            sample_rate: 16000,
            channel_count: 1,
            bitrate: 64000,
            codec_specific_data: vec![0x14, 0x08],
            samples_per_unit: 1024,
        };
        assert_eq!(format.unit_duration_us(), 64_000);
        assert_eq!(format.mime(), "audio/mp4a-latm");
    }
}
