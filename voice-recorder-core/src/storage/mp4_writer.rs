//! Streaming MP4 (`.m4a`) muxer for a single AAC track.
//!
//! ## File Layout
//!
//! ```text
//! [ftyp  M4A  — written on create]
//! [mdat  16-byte large-size header, size patched on finalize]
//!   [raw AAC access unit 1]
//!   [raw AAC access unit 2]
//!   ...
//! [moov  — written on finalize]
//!   mvhd
//!   trak → tkhd, mdia → mdhd, hdlr(soun), minf → smhd, dinf/dref,
//!          stbl → stsd(mp4a/esds), stts, stsc, stsz, stco
//! ```
//!
//! Samples are appended to `mdat` as they arrive; only their sizes and
//! timestamps are kept in memory. All samples live in one chunk.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::audio_models::TrackId;
use crate::models::error::PipelineError;
use crate::models::format::{AudioCodec, OutputFormat};
use crate::traits::container_sink::ContainerSink;

const MOVIE_TIMESCALE: u32 = 1000;
const TRACK_ID: u32 = 1;
const MDAT_HEADER_SIZE: u64 = 16;
/// ISO-639-2 "und" packed into 15 bits.
const LANGUAGE_UND: u16 = 0x55C4;
const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

struct Mp4Track {
    format: OutputFormat,
    sample_sizes: Vec<u32>,
    timestamps_us: Vec<u64>,
}

impl Mp4Track {
    /// Per-sample durations in media timescale (the sample rate).
    fn sample_durations(&self) -> Vec<u32> {
        let rate = self.format.sample_rate as u64;
        let to_ticks = |us: u64| us * rate / 1_000_000;
        let fallback = self.format.samples_per_unit.max(1);
        let mut durations = Vec::with_capacity(self.timestamps_us.len());
        for pair in self.timestamps_us.windows(2) {
            let delta = to_ticks(pair[1]).saturating_sub(to_ticks(pair[0])) as u32;
            durations.push(if delta == 0 { fallback } else { delta });
        }
        if !self.timestamps_us.is_empty() {
            durations.push(fallback);
        }
        durations
    }
}

/// `ContainerSink` producing an AAC-in-MP4 file.
pub struct Mp4FileSink {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    track: Option<Mp4Track>,
    started: bool,
    finalized: bool,
    mdat_offset: u64,
    mdat_payload: u64,
}

impl Mp4FileSink {
    /// Create the file and write `ftyp` plus the `mdat` header.
    pub fn create(file_path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::SinkError(format!("failed to create directory: {}", e)))?;
        }
        let file = File::create(&file_path)
            .map_err(|e| PipelineError::SinkError(format!("failed to create {}: {}", file_path.display(), e)))?;

        let mut sink = Self {
            file_path,
            file: Some(BufWriter::new(file)),
            track: None,
            started: false,
            finalized: false,
            mdat_offset: 0,
            mdat_payload: 0,
        };

        let ftyp = ftyp_box();
        sink.write_raw(&ftyp)?;
        sink.mdat_offset = ftyp.len() as u64;
        let mut mdat_header = Vec::with_capacity(MDAT_HEADER_SIZE as usize);
        mdat_header.extend_from_slice(&1u32.to_be_bytes());
        mdat_header.extend_from_slice(b"mdat");
        mdat_header.extend_from_slice(&MDAT_HEADER_SIZE.to_be_bytes());
        sink.write_raw(&mdat_header)?;
        Ok(sink)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn sample_count(&self) -> usize {
        self.track.as_ref().map_or(0, |t| t.sample_sizes.len())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), PipelineError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PipelineError::SinkError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| PipelineError::SinkError(format!("write failed: {}", e)))
    }

    fn build_moov(&self) -> Vec<u8> {
        let Some(track) = &self.track else {
            return make_box(b"moov", &mvhd_box(0, TRACK_ID));
        };

        let durations = track.sample_durations();
        let media_duration: u64 = durations.iter().map(|&d| d as u64).sum();
        let rate = track.format.sample_rate.max(1) as u64;
        let movie_duration = media_duration * MOVIE_TIMESCALE as u64 / rate;
        let chunk_offset = (self.mdat_offset + MDAT_HEADER_SIZE) as u32;

        let stbl = [
            stsd_box(&track.format),
            stts_box(&durations),
            stsc_box(track.sample_sizes.len()),
            stsz_box(&track.sample_sizes),
            stco_box(track.sample_sizes.len(), chunk_offset),
        ]
        .concat();

        let dref = full_box(b"dref", 0, 0, &[1u32.to_be_bytes().to_vec(), full_box(b"url ", 0, 1, &[])].concat());
        let minf = [
            full_box(b"smhd", 0, 0, &[0u8; 4]),
            make_box(b"dinf", &dref),
            make_box(b"stbl", &stbl),
        ]
        .concat();
        let mdia = [
            mdhd_box(track.format.sample_rate, media_duration),
            hdlr_box(),
            make_box(b"minf", &minf),
        ]
        .concat();
        let trak = [tkhd_box(movie_duration), make_box(b"mdia", &mdia)].concat();

        make_box(b"moov", &[mvhd_box(movie_duration, TRACK_ID + 1), make_box(b"trak", &trak)].concat())
    }
}

impl ContainerSink for Mp4FileSink {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackId, PipelineError> {
        if self.track.is_some() {
            return Err(PipelineError::SinkError("track already added".into()));
        }
        if format.codec != AudioCodec::Aac {
            return Err(PipelineError::SinkError(format!("mp4 sink cannot carry {}", format.mime())));
        }
        if format.codec_specific_data.len() < 2 {
            return Err(PipelineError::SinkError("missing AudioSpecificConfig".into()));
        }
        self.track = Some(Mp4Track {
            format: format.clone(),
            sample_sizes: Vec::new(),
            timestamps_us: Vec::new(),
        });
        Ok(TrackId(TRACK_ID))
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if self.track.is_none() {
            return Err(PipelineError::SinkError("start before add_track".into()));
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
        self.write_raw(payload)?;
        self.mdat_payload += payload.len() as u64;
        if let Some(t) = self.track.as_mut() {
            t.sample_sizes.push(payload.len() as u32);
            t.timestamps_us.push(timestamp_us);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), PipelineError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let moov = self.build_moov();
        self.write_raw(&moov)?;

        let mdat_size = MDAT_HEADER_SIZE + self.mdat_payload;
        let size_offset = self.mdat_offset + 8;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PipelineError::SinkError("file is not open".into()))?;
        file.seek(SeekFrom::Start(size_offset))
            .and_then(|_| file.write_all(&mdat_size.to_be_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| PipelineError::SinkError(format!("failed to patch mdat size: {}", e)))?;

        log::info!(
            "Finalized {} ({} samples, {} bytes of audio)",
            self.file_path.display(),
            self.sample_count(),
            self.mdat_payload
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                log::warn!("Flushing {} on release failed: {}", self.file_path.display(), e);
            }
        }
    }
}

// --- Box builders ---

fn make_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    make_box(kind, &body)
}

fn ftyp_box() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"M4A ");
    body.extend_from_slice(&0u32.to_be_bytes());
    for brand in [b"M4A ", b"mp42", b"isom"] {
        body.extend_from_slice(brand);
    }
    make_box(b"ftyp", &body)
}

fn matrix_bytes() -> Vec<u8> {
    UNITY_MATRIX.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Header boxes switch to version 1 (64-bit times) once the duration needs it.
fn time_version(duration: u64) -> u8 {
    u8::from(duration > u32::MAX as u64)
}

fn push_time(body: &mut Vec<u8>, version: u8, value: u64) {
    if version == 1 {
        body.extend_from_slice(&value.to_be_bytes());
    } else {
        body.extend_from_slice(&(value as u32).to_be_bytes());
    }
}

fn mvhd_box(duration: u64, next_track_id: u32) -> Vec<u8> {
    let version = time_version(duration);
    let mut body = Vec::new();
    push_time(&mut body, version, 0); // creation time
    push_time(&mut body, version, 0); // modification time
    body.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
    push_time(&mut body, version, duration);
    body.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    body.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    body.extend_from_slice(&[0u8; 10]);
    body.extend_from_slice(&matrix_bytes());
    body.extend_from_slice(&[0u8; 24]); // pre_defined
    body.extend_from_slice(&next_track_id.to_be_bytes());
    full_box(b"mvhd", version, 0, &body)
}

fn tkhd_box(duration: u64) -> Vec<u8> {
    let version = time_version(duration);
    let mut body = Vec::new();
    push_time(&mut body, version, 0);
    push_time(&mut body, version, 0);
    body.extend_from_slice(&TRACK_ID.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    push_time(&mut body, version, duration);
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(&0u16.to_be_bytes()); // layer
    body.extend_from_slice(&0u16.to_be_bytes()); // alternate group
    body.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&matrix_bytes());
    body.extend_from_slice(&0u32.to_be_bytes()); // width
    body.extend_from_slice(&0u32.to_be_bytes()); // height
    full_box(b"tkhd", version, 0x000003, &body)
}

fn mdhd_box(timescale: u32, duration: u64) -> Vec<u8> {
    let version = time_version(duration);
    let mut body = Vec::new();
    push_time(&mut body, version, 0);
    push_time(&mut body, version, 0);
    body.extend_from_slice(&timescale.to_be_bytes());
    push_time(&mut body, version, duration);
    body.extend_from_slice(&LANGUAGE_UND.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    full_box(b"mdhd", version, 0, &body)
}

fn hdlr_box() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(b"soun");
    body.extend_from_slice(&[0u8; 12]);
    body.extend_from_slice(b"SoundHandler\0");
    full_box(b"hdlr", 0, 0, &body)
}

/// MPEG-4 descriptor: tag, 4-byte expanded length, payload.
fn descriptor(tag: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut out = vec![
        tag,
        0x80 | ((len >> 21) & 0x7F) as u8,
        0x80 | ((len >> 14) & 0x7F) as u8,
        0x80 | ((len >> 7) & 0x7F) as u8,
        (len & 0x7F) as u8,
    ];
    out.extend_from_slice(payload);
    out
}

fn esds_box(format: &OutputFormat) -> Vec<u8> {
    let mut decoder_config = Vec::new();
    decoder_config.push(0x40); // object type: MPEG-4 audio
    decoder_config.push(0x15); // stream type audio (0x05 << 2) | reserved bit
    decoder_config.extend_from_slice(&[0, 0, 0]); // buffer size
    decoder_config.extend_from_slice(&format.bitrate.to_be_bytes()); // max bitrate
    decoder_config.extend_from_slice(&format.bitrate.to_be_bytes()); // avg bitrate
    decoder_config.extend_from_slice(&descriptor(0x05, &format.codec_specific_data));

    let mut es = Vec::new();
    es.extend_from_slice(&0u16.to_be_bytes()); // ES_ID
    es.push(0); // flags
    es.extend_from_slice(&descriptor(0x04, &decoder_config));
    es.extend_from_slice(&descriptor(0x06, &[0x02]));

    full_box(b"esds", 0, 0, &descriptor(0x03, &es))
}

fn stsd_box(format: &OutputFormat) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    entry.extend_from_slice(&[0u8; 8]);
    entry.extend_from_slice(&format.channel_count.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes()); // sample size
    entry.extend_from_slice(&0u16.to_be_bytes());
    entry.extend_from_slice(&0u16.to_be_bytes());
    entry.extend_from_slice(&(format.sample_rate.min(0xFFFF) << 16).to_be_bytes());
    entry.extend_from_slice(&esds_box(format));

    let mut body = 1u32.to_be_bytes().to_vec();
    body.extend_from_slice(&make_box(b"mp4a", &entry));
    full_box(b"stsd", 0, 0, &body)
}

fn stts_box(durations: &[u32]) -> Vec<u8> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &d in durations {
        match runs.last_mut() {
            Some((count, delta)) if *delta == d => *count += 1,
            _ => runs.push((1, d)),
        }
    }
    let mut body = (runs.len() as u32).to_be_bytes().to_vec();
    for (count, delta) in runs {
        body.extend_from_slice(&count.to_be_bytes());
        body.extend_from_slice(&delta.to_be_bytes());
    }
    full_box(b"stts", 0, 0, &body)
}

fn stsc_box(sample_count: usize) -> Vec<u8> {
    if sample_count == 0 {
        return full_box(b"stsc", 0, 0, &0u32.to_be_bytes());
    }
    let mut body = 1u32.to_be_bytes().to_vec();
    body.extend_from_slice(&1u32.to_be_bytes()); // first chunk
    body.extend_from_slice(&(sample_count as u32).to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes()); // sample description index
    full_box(b"stsc", 0, 0, &body)
}

fn stsz_box(sizes: &[u32]) -> Vec<u8> {
    let mut body = 0u32.to_be_bytes().to_vec();
    body.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
    for size in sizes {
        body.extend_from_slice(&size.to_be_bytes());
    }
    full_box(b"stsz", 0, 0, &body)
}

fn stco_box(sample_count: usize, offset: u32) -> Vec<u8> {
    if sample_count == 0 {
        return full_box(b"stco", 0, 0, &0u32.to_be_bytes());
    }
    let mut body = 1u32.to_be_bytes().to_vec();
    body.extend_from_slice(&offset.to_be_bytes());
    full_box(b"stco", 0, 0, &body)
}
