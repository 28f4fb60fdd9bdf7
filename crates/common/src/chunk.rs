//! Coded output — chunks of encoded bitstream and the per-stream codec
//! description the container needs to decode them.

use std::sync::Arc;

use crate::color::ColorSpaceDesc;
use crate::config::CodecId;

/// Finalized container bytes.
pub type Blob = Vec<u8>;

/// Per-stream metadata captured from the encoder's first output chunk and
/// shared by reference with the muxer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecDescription {
    pub codec: CodecId,
    pub coded_width: u32,
    pub coded_height: u32,
    /// Codec-private initialization data (`avcC` payload for AVC).
    pub description_blob: Vec<u8>,
    pub color: ColorSpaceDesc,
}

/// One encoded access unit in presentation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedChunk {
    pub data: Vec<u8>,
    pub pts_us: u64,
    pub duration_us: u64,
    pub is_key: bool,
}

/// Metadata accompanying a chunk on its way to the muxer.
///
/// Underlying codec APIs only attach the description to the first chunk of
/// a stream (and may omit it later); the encoder session captures it there
/// and re-attaches it to every forwarded chunk.
#[derive(Clone, Debug, Default)]
pub struct ChunkMeta {
    pub description: Option<Arc<CodecDescription>>,
}

impl ChunkMeta {
    pub fn with_description(description: Arc<CodecDescription>) -> Self {
        Self {
            description: Some(description),
        }
    }
}
