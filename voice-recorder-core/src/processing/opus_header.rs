//! Ogg Opus header packets (RFC 7845 §5).

/// Granule positions in Ogg Opus always count 48 kHz samples.
pub const OPUS_GRANULE_RATE: u32 = 48000;

/// Typical libopus encoder lookahead, expressed at 48 kHz.
pub const DEFAULT_PRE_SKIP: u16 = 312;

const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// Build the 19-byte identification header for mapping family 0.
pub fn opus_head(channels: u8, pre_skip: u16, input_sample_rate: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(19);
    header.extend_from_slice(OPUS_HEAD_MAGIC);
    header.push(1); // version
    header.push(channels);
    header.extend_from_slice(&pre_skip.to_le_bytes());
    header.extend_from_slice(&input_sample_rate.to_le_bytes());
    header.extend_from_slice(&0i16.to_le_bytes()); // output gain
    header.push(0); // channel mapping family
    header
}

/// Build a comment header with only a vendor string.
pub fn opus_tags(vendor: &str) -> Vec<u8> {
    let mut header = Vec::with_capacity(16 + vendor.len());
    header.extend_from_slice(OPUS_TAGS_MAGIC);
    header.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    header.extend_from_slice(vendor.as_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}

/// Fields of an `OpusHead` packet the muxer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHeadInfo {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

pub fn parse_opus_head(packet: &[u8]) -> Option<OpusHeadInfo> {
    if packet.len() < 19 || &packet[..8] != OPUS_HEAD_MAGIC {
        return None;
    }
    Some(OpusHeadInfo {
        channels: packet[9],
        pre_skip: u16::from_le_bytes([packet[10], packet[11]]),
        input_sample_rate: u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_layout() {
        let head = opus_head(1, DEFAULT_PRE_SKIP, 16000);
        assert_eq!(head.len(), 19);
        assert_eq!(&head[..8], b"OpusHead");
        assert_eq!(head[8], 1);
        assert_eq!(
            parse_opus_head(&head),
            Some(OpusHeadInfo {
                channels: 1,
                pre_skip: 312,
                input_sample_rate: 16000
            })
        );
    }

    #[test]
    fn tags_layout() {
        let tags = opus_tags("voice-recorder");
        assert_eq!(&tags[..8], b"OpusTags");
        assert_eq!(u32::from_le_bytes([tags[8], tags[9], tags[10], tags[11]]), 14);
        assert_eq!(tags.len(), 8 + 4 + 14 + 4);
    }

    #[test]
    fn rejects_non_head_packet() {
        assert!(parse_opus_head(&opus_tags("x")).is_none());
        assert!(parse_opus_head(b"OpusHead").is_none());
    }
}
