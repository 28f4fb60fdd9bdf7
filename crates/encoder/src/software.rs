//! Software AVC backend — deterministic bitstream synthesis.
//!
//! This backend stands in for a real codec on machines without an encode
//! bridge. It produces structurally honest output: a well-formed `avcC`
//! description built from the codec string's profile/level triplet and
//! placeholder parameter sets, and per-frame payloads that are a pure
//! function of the frame pixels and the target bitrate. That keeps the
//! whole pipeline — backpressure, chunk ordering, description capture,
//! muxing — exercised end to end with reproducible bytes.

use std::sync::Arc;

use tracing::debug;

use rf_common::{
    ChunkMeta, CodecDescription, CodecId, CodedChunk, ColorSpaceDesc, CompositedFrame,
    EncodeError, EncoderConfig,
};

use crate::backend::CodecBackend;

/// NAL unit types used in synthesized payloads.
const NAL_IDR: u8 = 0x65;
const NAL_NON_IDR: u8 = 0x41;

#[derive(Debug)]
pub struct SoftwareAvcBackend {
    config: EncoderConfig,
    description: Arc<CodecDescription>,
    /// Keyframe cadence the codec inserts on its own: one per second.
    natural_gop: u64,
    frames_encoded: u64,
}

impl SoftwareAvcBackend {
    pub fn supports(codec: &CodecId) -> bool {
        codec.is_avc_family() && parse_avc_triplet(codec).is_some()
    }

    pub fn new(config: EncoderConfig) -> Result<Self, EncodeError> {
        let (profile, compat, level) = parse_avc_triplet(&config.codec)
            .ok_or_else(|| EncodeError::CodecUnsupported(config.codec.clone()))?;

        let description = Arc::new(CodecDescription {
            codec: config.codec.clone(),
            coded_width: config.resolution.width,
            coded_height: config.resolution.height,
            description_blob: build_avcc(profile, compat, level),
            color: ColorSpaceDesc::OUTPUT,
        });

        let fps = config.fps;
        let natural_gop = ((fps.num as u64 + fps.den as u64 / 2) / fps.den as u64).max(1);

        debug!(
            codec = %config.codec,
            profile = format_args!("{profile:02x}"),
            level = format_args!("{level:02x}"),
            natural_gop,
            "Software AVC backend ready"
        );

        Ok(Self {
            config,
            description,
            natural_gop,
            frames_encoded: 0,
        })
    }

    fn payload_target_bytes(&self, keyframe: bool) -> usize {
        let fps = self.config.fps;
        let per_frame =
            (self.config.bitrate_bps / 8) as u128 * fps.den as u128 / fps.num as u128;
        let base = per_frame.max(64) as usize;
        if keyframe {
            base * 2
        } else {
            base
        }
    }
}

impl CodecBackend for SoftwareAvcBackend {
    fn encode(
        &mut self,
        frame: &CompositedFrame,
        keyframe: bool,
    ) -> Result<(CodedChunk, ChunkMeta), EncodeError> {
        let res = frame.image().resolution();
        if res != self.config.resolution {
            return Err(EncodeError::EncoderFailed(format!(
                "frame is {res}, encoder configured for {}",
                self.config.resolution
            )));
        }

        let is_key = keyframe || self.frames_encoded.is_multiple_of(self.natural_gop);
        let checksum = frame.image().checksum();
        let target = self.payload_target_bytes(is_key);

        // Length-prefixed NAL-shaped payload: type, pts, content hash,
        // then deterministic filler up to the bitrate-derived size.
        let mut data = Vec::with_capacity(target + 4);
        data.extend_from_slice(&[0, 0, 0, 0]); // length prefix, patched below
        data.push(if is_key { NAL_IDR } else { NAL_NON_IDR });
        data.extend_from_slice(&frame.eff_ts_us().to_be_bytes());
        data.extend_from_slice(&checksum.to_be_bytes());
        let mut state = checksum | 1;
        while data.len() < target + 4 {
            // xorshift64 keeps the filler content-dependent but reproducible
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            data.push(state as u8);
        }
        let nal_len = (data.len() - 4) as u32;
        data[0..4].copy_from_slice(&nal_len.to_be_bytes());

        let meta = if self.frames_encoded == 0 {
            ChunkMeta::with_description(Arc::clone(&self.description))
        } else {
            // Real codec callbacks omit the description after the first
            // chunk; mirror that so the session's re-attachment is load
            // bearing.
            ChunkMeta::default()
        };
        self.frames_encoded += 1;

        Ok((
            CodedChunk {
                data,
                pts_us: frame.eff_ts_us(),
                duration_us: frame.duration_us(),
                is_key,
            },
            meta,
        ))
    }

    fn flush(&mut self) -> Result<Vec<(CodedChunk, ChunkMeta)>, EncodeError> {
        // The synthesis path has no internal queue.
        debug!(frames = self.frames_encoded, "Software backend flushed");
        Ok(Vec::new())
    }
}

/// Parse `avc1.PPCCLL` into (profile, constraints, level). A bare family
/// name falls back to High 5.1 (the default codec string's triplet).
fn parse_avc_triplet(codec: &CodecId) -> Option<(u8, u8, u8)> {
    let s = codec.as_str();
    let tail = s
        .strip_prefix("avc1")
        .or_else(|| s.strip_prefix("avc3"))?;
    if tail.is_empty() {
        return Some((0x64, 0x00, 0x33));
    }
    let hex = tail.strip_prefix('.')?;
    if hex.len() != 6 {
        return None;
    }
    let profile = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let compat = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let level = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((profile, compat, level))
}

/// Assemble an `AVCDecoderConfigurationRecord` around placeholder
/// parameter sets carrying the requested profile/level.
fn build_avcc(profile: u8, compat: u8, level: u8) -> Vec<u8> {
    let sps = [0x67, profile, compat, level, 0xDA, 0x02, 0x80, 0xF6];
    let pps = [0x68, 0xCE, 0x38, 0x80];

    let mut blob = Vec::with_capacity(11 + sps.len() + 3 + pps.len());
    blob.push(1); // configurationVersion
    blob.push(profile);
    blob.push(compat);
    blob.push(level);
    blob.push(0xFC | 3); // lengthSizeMinusOne = 3 (4-byte prefixes)
    blob.push(0xE0 | 1); // one SPS
    blob.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    blob.extend_from_slice(&sps);
    blob.push(1); // one PPS
    blob.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    blob.extend_from_slice(&pps);
    blob
}
