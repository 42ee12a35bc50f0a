//! Ogg Opus (`.opus`) muxer.
//!
//! `OpusHead` and `OpusTags` each sit on their own page, then audio
//! packets follow with 48 kHz granule positions. The most recent packet
//! is held back so finalize can flag it end-of-stream and trim its granule
//! to the real end of the audio. A stream with no audio packets is closed
//! with an empty end-of-stream packet.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use crate::models::audio_models::TrackId;
use crate::models::error::PipelineError;
use crate::models::format::{AudioCodec, OutputFormat};
use crate::processing::opus_header::{
    opus_head, opus_tags, parse_opus_head, DEFAULT_PRE_SKIP, OPUS_GRANULE_RATE,
};
use crate::traits::container_sink::ContainerSink;

const TRACK_ID: u32 = 1;
const VENDOR: &str = concat!("voice-recorder ", env!("CARGO_PKG_VERSION"));

/// `ContainerSink` producing an Ogg Opus file.
pub struct OggOpusSink {
    file_path: PathBuf,
    writer: Option<PacketWriter<'static, BufWriter<File>>>,
    serial: u32,
    /// Samples per packet at 48 kHz.
    granule_step: u64,
    granule: u64,
    pre_skip: u64,
    first_timestamp_us: Option<u64>,
    pending: Option<(Vec<u8>, u64)>,
    /// `OpusHead` held between `add_track` and `start`.
    head: Option<Vec<u8>>,
    has_track: bool,
    started: bool,
    finalized: bool,
    packets_written: u64,
}

impl OggOpusSink {
    pub fn create(file_path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::SinkError(format!("failed to create directory: {}", e)))?;
        }
        let file = File::create(&file_path)
            .map_err(|e| PipelineError::SinkError(format!("failed to create {}: {}", file_path.display(), e)))?;

        Ok(Self {
            file_path,
            writer: Some(PacketWriter::new(BufWriter::new(file))),
            serial: uuid::Uuid::new_v4().as_u128() as u32,
            granule_step: 0,
            granule: 0,
            pre_skip: 0,
            first_timestamp_us: None,
            pending: None,
            head: None,
            has_track: false,
            started: false,
            finalized: false,
            packets_written: 0,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Audio packets handed to the Ogg layer so far, including the held one.
    pub fn packet_count(&self) -> u64 {
        self.packets_written + self.pending.is_some() as u64
    }

    fn write_packet(&mut self, packet: Vec<u8>, end: PacketWriteEndInfo, granule: u64) -> Result<(), PipelineError> {
        let serial = self.serial;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::SinkError("file is not open".into()))?;
        writer
            .write_packet(packet, serial, end, granule)
            .map_err(|e| PipelineError::SinkError(format!("ogg write failed: {}", e)))
    }
}

impl ContainerSink for OggOpusSink {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackId, PipelineError> {
        if self.has_track {
            return Err(PipelineError::SinkError("track already added".into()));
        }
        if format.codec != AudioCodec::Opus {
            return Err(PipelineError::SinkError(format!("ogg sink cannot carry {}", format.mime())));
        }

        // Use the encoder's own OpusHead when it supplied one.
        let head = match parse_opus_head(&format.codec_specific_data) {
            Some(_) => format.codec_specific_data.clone(),
            None => opus_head(format.channel_count as u8, DEFAULT_PRE_SKIP, format.sample_rate),
        };
        let pre_skip = parse_opus_head(&head).map_or(DEFAULT_PRE_SKIP, |h| h.pre_skip);
        let rate = format.sample_rate.max(1) as u64;
        self.granule_step = format.samples_per_unit as u64 * OPUS_GRANULE_RATE as u64 / rate;
        self.pre_skip = pre_skip as u64;
        self.granule = self.pre_skip;
        self.head = Some(head);
        self.has_track = true;
        Ok(TrackId(TRACK_ID))
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if !self.has_track {
            return Err(PipelineError::SinkError("start before add_track".into()));
        }
        if let Some(head) = self.head.take() {
            self.write_packet(head, PacketWriteEndInfo::EndPage, 0)?;
            self.write_packet(opus_tags(VENDOR), PacketWriteEndInfo::EndPage, 0)?;
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackId, payload: &[u8], timestamp_us: u64) -> Result<(), PipelineError> {
        if !self.started || self.finalized {
            return Err(PipelineError::SinkError("write_sample outside started state".into()));
        }
        if track != TrackId(TRACK_ID) {
            return Err(PipelineError::SinkError(format!("unknown track {:?}", track)));
        }
        self.first_timestamp_us.get_or_insert(timestamp_us);
        self.granule += self.granule_step;
        if let Some((packet, granule)) = self.pending.replace((payload.to_vec(), self.granule)) {
            self.write_packet(packet, PacketWriteEndInfo::NormalPacket, granule)?;
            self.packets_written += 1;
        }
        Ok(())
    }

    /// Lower the held packet's granule to the end of the real audio, so
    /// players drop the encoder's zero padding. Ends outside the last
    /// packet's span are ignored.
    fn set_end_timestamp(&mut self, track: TrackId, timestamp_us: u64) -> Result<(), PipelineError> {
        if track != TrackId(TRACK_ID) {
            return Err(PipelineError::SinkError(format!("unknown track {:?}", track)));
        }
        let (Some(first_us), Some((_, granule))) = (self.first_timestamp_us, self.pending.as_mut()) else {
            return Ok(());
        };
        let end = self.pre_skip + timestamp_us.saturating_sub(first_us) * OPUS_GRANULE_RATE as u64 / 1_000_000;
        let packet_start = granule.saturating_sub(self.granule_step);
        if end > packet_start && end < *granule {
            log::debug!("Trimming last packet by {} samples", *granule - end);
            *granule = end;
            self.granule = end;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), PipelineError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if let Some((packet, granule)) = self.pending.take() {
            self.write_packet(packet, PacketWriteEndInfo::EndStream, granule)?;
            self.packets_written += 1;
        } else if self.started {
            // Headers only: close the logical stream with an empty packet.
            self.write_packet(Vec::new(), PacketWriteEndInfo::EndStream, self.pre_skip)?;
        }
        if let Some(writer) = self.writer.take() {
            writer
                .into_inner()
                .flush()
                .map_err(|e| PipelineError::SinkError(format!("flush failed: {}", e)))?;
        }
        log::info!(
            "Finalized {} ({} opus packets)",
            self.file_path.display(),
            self.packets_written
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.into_inner().flush() {
                log::warn!("Flushing {} on release failed: {}", self.file_path.display(), e);
            }
        }
    }
}
