pub mod capture_source;
pub mod codec_adapter;
pub mod component_factory;
pub mod container_sink;
pub mod pipeline_delegate;
