//! Low-level MP4 atom/box writing primitives.
//!
//! MP4 files are structured as nested boxes. Each box has a 4-byte
//! big-endian size (including the header) and a 4-byte ASCII type. "Full
//! boxes" additionally carry a 1-byte version and 3-byte flags.
//!
//! Leaf and branch boxes of the moov tree are assembled in memory with
//! [`push_box`]/[`push_full_box`]; only the mdat box — whose size is
//! unknown while samples stream in — uses the placeholder/patch pair.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};

use rf_common::MuxError;

/// Track timescale: one tick per microsecond, so sample timestamps and
/// durations are exact.
pub const TRACK_TIMESCALE: u32 = 1_000_000;

/// Movie-level timescale (millisecond precision).
pub const MOVIE_TIMESCALE: u32 = 1_000;

/// Append a box with the given payload.
pub fn push_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&((payload.len() as u32 + 8).to_be_bytes()));
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}

/// Append a full box: version + 24-bit flags precede the payload.
pub fn push_full_box(out: &mut Vec<u8>, kind: &[u8; 4], version: u8, flags: u32, payload: &[u8]) {
    out.extend_from_slice(&((payload.len() as u32 + 12).to_be_bytes()));
    out.extend_from_slice(kind);
    out.extend_from_slice(&(((version as u32) << 24) | (flags & 0x00FF_FFFF)).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Start a streamed box with a 64-bit extended size (size=1 signals the
/// extended field). Returns the position of the 8-byte size field to patch
/// once the content length is known.
pub fn large_box_placeholder<W: Write + Seek>(
    writer: &mut W,
    kind: &[u8; 4],
) -> Result<u64, MuxError> {
    writer.write_u32::<BigEndian>(1)?;
    writer.write_all(kind)?;
    let size_pos = writer.stream_position()?;
    writer.write_u64::<BigEndian>(0)?;
    Ok(size_pos)
}

/// Patch a large box's extended size from its placeholder position to the
/// current stream position.
pub fn patch_large_box_size<W: Write + Seek>(writer: &mut W, size_pos: u64) -> Result<(), MuxError> {
    let current = writer.stream_position()?;
    // The 8-byte standard header sits before the extended size field.
    let total_size = current - (size_pos - 8);
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u64::<BigEndian>(total_size)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Convert microseconds to timescale ticks (exact for the track timescale).
pub fn us_to_ticks(us: u64, timescale: u32) -> u64 {
    (us as u128 * timescale as u128 / 1_000_000u128) as u64
}
