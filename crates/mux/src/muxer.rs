//! High-level MP4 muxer producing an in-memory blob.

use std::io::{Cursor, Seek, Write};
use std::sync::Arc;

use tracing::{debug, info};

use rf_common::{Blob, ChunkMeta, CodecDescription, CodedChunk, ContainerMuxer, MuxError};

use crate::atoms::{large_box_placeholder, patch_large_box_size};
use crate::mp4::{build_moov, write_ftyp, SampleInfo};

/// MP4 muxer for a single video track.
///
/// Layout: `ftyp`, a streamed large-size `mdat` holding chunk data in
/// arrival order, then the `moov` tree written at finalize. The codec
/// description is taken from the first chunk's metadata and must be
/// present there.
pub struct Mp4Muxer {
    out: Cursor<Vec<u8>>,
    mdat_size_pos: u64,
    samples: Vec<SampleInfo>,
    description: Option<Arc<CodecDescription>>,
    last_pts_us: Option<u64>,
}

impl Mp4Muxer {
    pub fn new() -> Result<Self, MuxError> {
        let mut out = Cursor::new(Vec::new());
        write_ftyp(&mut out).map_err(|e| MuxError::MuxerInit(e.to_string()))?;
        let mdat_size_pos = large_box_placeholder(&mut out, b"mdat")
            .map_err(|e| MuxError::MuxerInit(e.to_string()))?;
        debug!("MP4 muxer initialized");
        Ok(Self {
            out,
            mdat_size_pos,
            samples: Vec::new(),
            description: None,
            last_pts_us: None,
        })
    }

    fn capture_description(&mut self, meta: &ChunkMeta) -> Result<(), MuxError> {
        let desc = meta
            .description
            .as_ref()
            .ok_or(MuxError::MissingCodecDescription)?;
        if desc.description_blob.is_empty() {
            return Err(MuxError::MissingCodecDescription);
        }
        if !desc.codec.is_avc_family() {
            return Err(MuxError::MuxFailed(format!(
                "no MP4 mapping for codec {}",
                desc.codec
            )));
        }
        debug!(
            codec = %desc.codec,
            coded = format_args!("{}x{}", desc.coded_width, desc.coded_height),
            blob_len = desc.description_blob.len(),
            "Captured codec description"
        );
        self.description = Some(Arc::clone(desc));
        Ok(())
    }
}

impl ContainerMuxer for Mp4Muxer {
    fn add_chunk(&mut self, chunk: &CodedChunk, meta: &ChunkMeta) -> Result<(), MuxError> {
        if self.description.is_none() {
            self.capture_description(meta)?;
        }

        if let Some(last) = self.last_pts_us {
            if chunk.pts_us <= last {
                return Err(MuxError::MuxFailed(format!(
                    "non-monotonic pts: {} after {last}",
                    chunk.pts_us
                )));
            }
        }
        self.last_pts_us = Some(chunk.pts_us);

        let offset = self.out.stream_position()?;
        self.out.write_all(&chunk.data)?;
        self.samples.push(SampleInfo {
            offset,
            size: chunk.data.len() as u32,
            duration_us: chunk.duration_us,
            is_key: chunk.is_key,
        });
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<Blob, MuxError> {
        let desc = self
            .description
            .take()
            .ok_or_else(|| MuxError::MuxFailed("finalize with no samples".to_string()))?;

        patch_large_box_size(&mut self.out, self.mdat_size_pos)?;

        let moov = build_moov(&desc, &self.samples);
        self.out.write_all(&moov)?;

        let blob = self.out.into_inner();
        info!(
            samples = self.samples.len(),
            bytes = blob.len(),
            "MP4 finalized"
        );
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_common::{CodecId, ColorSpaceDesc};

    fn description() -> Arc<CodecDescription> {
        Arc::new(CodecDescription {
            codec: CodecId::default(),
            coded_width: 1280,
            coded_height: 720,
            description_blob: vec![1, 0x64, 0x00, 0x33, 0xFF, 0xE1, 0, 4, 0x67, 1, 2, 3],
            color: ColorSpaceDesc::OUTPUT,
        })
    }

    fn chunk(pts_us: u64, is_key: bool) -> CodedChunk {
        CodedChunk {
            data: vec![0, 0, 0, 4, 0x65, 0xAA, 0xBB, 0xCC],
            pts_us,
            duration_us: 33_333,
            is_key,
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn first_chunk_without_description_is_rejected() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        let err = muxer
            .add_chunk(&chunk(0, true), &ChunkMeta::default())
            .unwrap_err();
        assert!(matches!(err, MuxError::MissingCodecDescription));
    }

    #[test]
    fn empty_description_blob_is_rejected() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        let desc = Arc::new(CodecDescription {
            description_blob: Vec::new(),
            ..(*description()).clone()
        });
        let err = muxer
            .add_chunk(&chunk(0, true), &ChunkMeta::with_description(desc))
            .unwrap_err();
        assert!(matches!(err, MuxError::MissingCodecDescription));
    }

    #[test]
    fn non_avc_codec_is_rejected() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        let desc = Arc::new(CodecDescription {
            codec: CodecId::new("vp09.00.10.08"),
            ..(*description()).clone()
        });
        let err = muxer
            .add_chunk(&chunk(0, true), &ChunkMeta::with_description(desc))
            .unwrap_err();
        assert!(matches!(err, MuxError::MuxFailed(_)));
    }

    #[test]
    fn later_chunks_need_no_description() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        muxer
            .add_chunk(&chunk(0, true), &ChunkMeta::with_description(description()))
            .unwrap();
        muxer
            .add_chunk(&chunk(33_333, false), &ChunkMeta::default())
            .unwrap();
        let blob = muxer.finalize().unwrap();
        assert!(!blob.is_empty());
    }

    #[test]
    fn non_monotonic_pts_is_rejected() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        muxer
            .add_chunk(&chunk(33_333, true), &ChunkMeta::with_description(description()))
            .unwrap();
        let err = muxer
            .add_chunk(&chunk(33_333, false), &ChunkMeta::default())
            .unwrap_err();
        assert!(matches!(err, MuxError::MuxFailed(_)));
    }

    #[test]
    fn finalize_without_samples_fails() {
        let muxer = Box::new(Mp4Muxer::new().unwrap());
        assert!(matches!(muxer.finalize(), Err(MuxError::MuxFailed(_))));
    }

    #[test]
    fn blob_structure() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        for i in 0..10u64 {
            let meta = if i == 0 {
                ChunkMeta::with_description(description())
            } else {
                ChunkMeta::default()
            };
            muxer.add_chunk(&chunk(i * 33_333, i == 0), &meta).unwrap();
        }
        let blob = muxer.finalize().unwrap();

        // ftyp first, then the large mdat, moov last.
        assert_eq!(&blob[4..8], b"ftyp");
        assert_eq!(&blob[32..36], b"mdat");
        assert!(contains(&blob, b"moov"));
        assert!(contains(&blob, b"avcC"));
        assert!(contains(&blob, &description().description_blob));

        // moov is the last top-level box.
        let mut offset = 0usize;
        let mut last = [0u8; 4];
        while offset + 8 <= blob.len() {
            let size = u32::from_be_bytes(blob[offset..offset + 4].try_into().unwrap());
            last.copy_from_slice(&blob[offset + 4..offset + 8]);
            let advance = if size == 1 {
                u64::from_be_bytes(blob[offset + 8..offset + 16].try_into().unwrap()) as usize
            } else {
                size as usize
            };
            offset += advance;
        }
        assert_eq!(&last, b"moov");
    }

    #[test]
    fn chunk_bytes_land_in_mdat() {
        let mut muxer = Box::new(Mp4Muxer::new().unwrap());
        let payload = chunk(0, true);
        muxer
            .add_chunk(&payload, &ChunkMeta::with_description(description()))
            .unwrap();
        let blob = muxer.finalize().unwrap();
        assert!(contains(&blob, &payload.data));
    }
}
