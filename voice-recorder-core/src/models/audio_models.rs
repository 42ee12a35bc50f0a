/// One capture read's worth of raw PCM.
///
/// Fixed capacity; `len` marks how much of it the last read filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    data: Vec<u8>,
    len: usize,
}

impl PcmFrame {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole backing buffer, for a source to read into.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mark `len` bytes as valid, clamped to capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Flags attached to an encoder output unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UnitFlags {
    /// Carries codec initialization data, not audio.
    pub config: bool,
    /// Last unit the codec will produce.
    pub end_of_stream: bool,
}

/// A compressed chunk taken from the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub payload: Vec<u8>,
    /// Microseconds since pipeline start.
    pub timestamp_us: u64,
    pub flags: UnitFlags,
}

impl AccessUnit {
    pub fn data(payload: Vec<u8>, timestamp_us: u64) -> Self {
        Self {
            payload,
            timestamp_us,
            flags: UnitFlags::default(),
        }
    }

    pub fn config(payload: Vec<u8>) -> Self {
        Self {
            payload,
            timestamp_us: 0,
            flags: UnitFlags {
                config: true,
                end_of_stream: false,
            },
        }
    }

    pub fn end_of_stream(payload: Vec<u8>, timestamp_us: u64) -> Self {
        Self {
            payload,
            timestamp_us,
            flags: UnitFlags {
                config: false,
                end_of_stream: true,
            },
        }
    }

    pub fn is_config(&self) -> bool {
        self.flags.config
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.end_of_stream
    }
}

/// Result of offering input to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// No input slot freed up within the timeout.
    Busy,
}

/// Track handle returned by a container sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

/// Input level metering for the most recent frame (0.0–1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevels {
    pub rms: f32,
    pub peak: f32,
}

/// Counters the worker publishes while a session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub empty_reads: u64,
    pub inputs_accepted: u64,
    pub frames_dropped_busy: u64,
    pub bytes_truncated: u64,
    pub config_units: u64,
    pub units_written: u64,
    pub units_dropped_unregistered: u64,
    pub bytes_muxed: u64,
    pub end_of_stream_seen: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_is_clamped() {
        let mut frame = PcmFrame::with_capacity(4);
        frame.buffer_mut().copy_from_slice(&[1, 2, 3, 4]);
        frame.set_len(10);
        assert_eq!(frame.len(), 4);
        frame.set_len(2);
        assert_eq!(frame.bytes(), &[1, 2]);
        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.capacity(), 4);
    }

    #[test]
    fn unit_constructors_set_flags() {
        assert!(AccessUnit::config(vec![0x14, 0x08]).is_config());
        assert!(AccessUnit::end_of_stream(Vec::new(), 5).is_end_of_stream());
        let unit = AccessUnit::data(vec![1], 7);
        assert!(!unit.is_config() && !unit.is_end_of_stream());
        assert_eq!(unit.timestamp_us, 7);
    }
}
