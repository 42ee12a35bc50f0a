pub mod adts;
pub mod opus_header;
pub mod pcm;
pub mod ring_buffer;
