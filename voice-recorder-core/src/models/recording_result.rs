use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::PipelineStats;
use super::config::{ContainerKind, PipelineConfig};

/// Returned by `stop()` once the container file is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub stats: PipelineStats,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Description of a finished recording, exported as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub container: ContainerKind,
    pub mime: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    pub duration_secs: f64,
    pub checksum: String,
    pub units_written: u64,
}

impl RecordingMetadata {
    pub fn new(config: &PipelineConfig, duration_secs: f64, checksum: &str, units_written: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: config.output_path.to_string_lossy().to_string(),
            container: config.container_kind,
            mime: config.container_kind.codec().mime().to_string(),
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            bitrate: config.target_bitrate,
            duration_secs,
            checksum: checksum.to_string(),
            units_written,
        }
    }
}
