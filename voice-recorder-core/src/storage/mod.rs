pub mod checksum;
pub mod metadata;
pub mod mp4_writer;
pub mod ogg_writer;

use crate::models::config::{ContainerKind, PipelineConfig};
use crate::models::error::PipelineError;
use crate::traits::container_sink::ContainerSink;

use self::mp4_writer::Mp4FileSink;
use self::ogg_writer::OggOpusSink;

/// Open the file-backed muxer matching `config.container_kind`.
pub fn create_sink(config: &PipelineConfig) -> Result<Box<dyn ContainerSink>, PipelineError> {
    Ok(match config.container_kind {
        ContainerKind::AacInMp4 => Box::new(Mp4FileSink::create(&config.output_path)?),
        ContainerKind::OpusInOgg => Box::new(OggOpusSink::create(&config.output_path)?),
    })
}
