//! ADTS framing and AAC `AudioSpecificConfig` helpers.
//!
//! Encoders that stream AAC (ffmpeg `-f adts`) prefix every access unit with
//! a 7- or 9-byte ADTS header. MP4 wants the raw access unit plus a 2-byte
//! `AudioSpecificConfig` in `esds`, so both directions are needed.
//!
//! Header layout (bit widths):
//! ```text
//! syncword 12 | id 1 | layer 2 | protection_absent 1
//! profile 2 | sampling_index 4 | private 1 | channel_config 3
//! original 1 | home 1 | copyright_id 1 | copyright_start 1
//! frame_length 13 | buffer_fullness 11 | raw_blocks 2
//! [crc 16 when protection_absent == 0]
//! ```

/// Sampling frequencies by ADTS/ASC index.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// AAC Low Complexity audio object type.
pub const AOT_AAC_LC: u8 = 2;

/// PCM samples per AAC-LC access unit.
pub const AAC_SAMPLES_PER_FRAME: u32 = 1024;

const MIN_HEADER_LEN: usize = 7;

pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&f| f == sample_rate)
        .map(|i| i as u8)
}

/// Build the 2-byte `AudioSpecificConfig`.
pub fn audio_specific_config(object_type: u8, sampling_index: u8, channel_config: u8) -> [u8; 2] {
    [
        (object_type << 3) | (sampling_index >> 1),
        ((sampling_index & 0x01) << 7) | ((channel_config & 0x0F) << 3),
    ]
}

/// Decode `(object_type, sampling_index, channel_config)` from an `AudioSpecificConfig`.
pub fn parse_audio_specific_config(asc: &[u8]) -> Option<(u8, u8, u8)> {
    if asc.len() < 2 {
        return None;
    }
    let object_type = asc[0] >> 3;
    let sampling_index = ((asc[0] & 0x07) << 1) | (asc[1] >> 7);
    let channel_config = (asc[1] >> 3) & 0x0F;
    Some((object_type, sampling_index, channel_config))
}

/// Fields of one ADTS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub object_type: u8,
    pub sampling_index: u8,
    pub channel_config: u8,
    /// Header plus payload, in bytes.
    pub frame_length: usize,
    pub header_length: usize,
}

impl AdtsHeader {
    /// Parse a header at the start of `data`. `None` if there is no sync word
    /// or fewer than 7 bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_HEADER_LEN || data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
            return None;
        }
        let protection_absent = data[1] & 0x01 == 1;
        let profile = (data[2] >> 6) & 0x03;
        let sampling_index = (data[2] >> 2) & 0x0F;
        let channel_config = ((data[2] & 0x01) << 2) | (data[3] >> 6);
        let frame_length =
            (((data[3] & 0x03) as usize) << 11) | ((data[4] as usize) << 3) | ((data[5] as usize) >> 5);
        let header_length = if protection_absent { 7 } else { 9 };
        if frame_length < header_length || sampling_index as usize >= SAMPLING_FREQUENCIES.len() {
            return None;
        }
        Some(Self {
            object_type: profile + 1,
            sampling_index,
            channel_config,
            frame_length,
            header_length,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLING_FREQUENCIES[self.sampling_index as usize]
    }

    pub fn payload_length(&self) -> usize {
        self.frame_length - self.header_length
    }

    pub fn audio_specific_config(&self) -> [u8; 2] {
        audio_specific_config(self.object_type, self.sampling_index, self.channel_config)
    }
}

/// Build a 7-byte ADTS header (no CRC) for a payload of `payload_len` bytes.
pub fn write_header(object_type: u8, sampling_index: u8, channel_config: u8, payload_len: usize) -> [u8; 7] {
    let frame_length = payload_len + MIN_HEADER_LEN;
    let profile = object_type.saturating_sub(1) & 0x03;
    [
        0xFF,
        0xF1,
        (profile << 6) | ((sampling_index & 0x0F) << 2) | ((channel_config >> 2) & 0x01),
        ((channel_config & 0x03) << 6) | ((frame_length >> 11) & 0x03) as u8,
        ((frame_length >> 3) & 0xFF) as u8,
        (((frame_length & 0x07) << 5) as u8) | 0x1F,
        0xFC,
    ]
}

/// Splits a byte stream into ADTS frames as bytes arrive.
#[derive(Debug, Default)]
pub struct AdtsFrameReader {
    pending: Vec<u8>,
    skipped: u64,
}

impl AdtsFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete frame as `(header, raw payload)`, or `None` until more bytes arrive.
    ///
    /// Bytes before a valid sync word are discarded.
    pub fn next_frame(&mut self) -> Option<(AdtsHeader, Vec<u8>)> {
        loop {
            let start = self
                .pending
                .windows(2)
                .position(|w| w[0] == 0xFF && w[1] & 0xF0 == 0xF0);
            let Some(start) = start else {
                // Keep a lone trailing 0xFF; it may be the first half of a sync word.
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let drop = self.pending.len() - keep;
                self.skipped += drop as u64;
                self.pending.drain(..drop);
                return None;
            };
            if start > 0 {
                self.skipped += start as u64;
                self.pending.drain(..start);
            }
            if self.pending.len() < MIN_HEADER_LEN {
                return None;
            }
            let Some(header) = AdtsHeader::parse(&self.pending) else {
                // False sync; step past it.
                self.skipped += 1;
                self.pending.drain(..1);
                continue;
            };
            if self.pending.len() < header.frame_length {
                return None;
            }
            let frame: Vec<u8> = self.pending.drain(..header.frame_length).collect();
            return Some((header, frame[header.header_length..].to_vec()));
        }
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bytes discarded while searching for sync.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
