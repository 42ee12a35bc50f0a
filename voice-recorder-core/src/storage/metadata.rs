use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::PipelineError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar path for a recording: `{recording_path}.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    let mut name = recording_path.as_os_str().to_os_string();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, PipelineError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| PipelineError::SinkError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| PipelineError::SinkError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, PipelineError> {
    let path = metadata_path(recording_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| PipelineError::SinkError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| PipelineError::SinkError(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{ContainerKind, PipelineConfig};

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("take1.m4a");
        let config = PipelineConfig::new(ContainerKind::AacInMp4, &recording);
        let metadata = RecordingMetadata::new(&config, 1.5, "abc123", 24);

        let written = write_metadata(&metadata, &recording).unwrap();
        assert_eq!(written, dir.path().join("take1.m4a.metadata.json"));

        let loaded = read_metadata(&recording).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.mime, "audio/mp4a-latm");
    }

    #[test]
    fn missing_sidecar_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata(&dir.path().join("nope.opus")).unwrap_err();
        assert!(err.is_sink());
    }
}
