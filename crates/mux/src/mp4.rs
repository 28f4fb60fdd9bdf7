//! MP4 structural boxes — ftyp and the moov tree for one video track.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

use rf_common::{CodecDescription, MuxError};

use crate::atoms::{push_box, push_full_box, us_to_ticks, MOVIE_TIMESCALE, TRACK_TIMESCALE};

/// Per-sample metadata collected while chunk data streams into mdat.
#[derive(Clone, Debug)]
pub struct SampleInfo {
    /// Absolute byte offset of the sample in the file.
    pub offset: u64,
    pub size: u32,
    pub duration_us: u64,
    pub is_key: bool,
}

/// Write the file-type box. Streamed directly: it is always the first box.
pub fn write_ftyp<W: Write>(writer: &mut W) -> Result<(), MuxError> {
    let mut payload = Vec::with_capacity(20);
    payload.extend_from_slice(b"isom");
    payload.write_u32::<BigEndian>(0x200)?;
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(b"iso2");
    payload.extend_from_slice(b"avc1");
    payload.extend_from_slice(b"mp41");

    let mut boxed = Vec::with_capacity(28);
    push_box(&mut boxed, b"ftyp", &payload);
    writer.write_all(&boxed)?;
    Ok(())
}

/// Assemble the complete moov box for a single video track.
pub fn build_moov(desc: &CodecDescription, samples: &[SampleInfo]) -> Vec<u8> {
    let duration_us: u64 = samples.iter().map(|s| s.duration_us).sum();

    let mut moov_payload = Vec::new();
    moov_payload.extend(build_mvhd(duration_us));
    moov_payload.extend(build_trak(desc, samples, duration_us));

    let mut moov = Vec::new();
    push_box(&mut moov, b"moov", &moov_payload);
    moov
}

fn build_mvhd(duration_us: u64) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes()); // creation_time
    p.extend_from_slice(&0u32.to_be_bytes()); // modification_time
    p.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
    p.extend_from_slice(&(us_to_ticks(duration_us, MOVIE_TIMESCALE) as u32).to_be_bytes());
    p.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    p.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    p.extend_from_slice(&[0u8; 10]); // reserved
    p.extend(identity_matrix());
    p.extend_from_slice(&[0u8; 24]); // pre_defined
    p.extend_from_slice(&2u32.to_be_bytes()); // next_track_ID

    let mut out = Vec::new();
    push_full_box(&mut out, b"mvhd", 0, 0, &p);
    out
}

fn identity_matrix() -> Vec<u8> {
    let mut m = Vec::with_capacity(36);
    for value in [
        0x0001_0000u32,
        0,
        0,
        0,
        0x0001_0000,
        0,
        0,
        0,
        0x4000_0000,
    ] {
        m.extend_from_slice(&value.to_be_bytes());
    }
    m
}

fn build_trak(desc: &CodecDescription, samples: &[SampleInfo], duration_us: u64) -> Vec<u8> {
    let mut trak_payload = Vec::new();
    trak_payload.extend(build_tkhd(desc, duration_us));
    trak_payload.extend(build_mdia(desc, samples, duration_us));

    let mut out = Vec::new();
    push_box(&mut out, b"trak", &trak_payload);
    out
}

fn build_tkhd(desc: &CodecDescription, duration_us: u64) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes()); // creation_time
    p.extend_from_slice(&0u32.to_be_bytes()); // modification_time
    p.extend_from_slice(&1u32.to_be_bytes()); // track_ID
    p.extend_from_slice(&0u32.to_be_bytes()); // reserved
    p.extend_from_slice(&(us_to_ticks(duration_us, MOVIE_TIMESCALE) as u32).to_be_bytes());
    p.extend_from_slice(&[0u8; 8]); // reserved
    p.extend_from_slice(&0u16.to_be_bytes()); // layer
    p.extend_from_slice(&0u16.to_be_bytes()); // alternate_group
    p.extend_from_slice(&0u16.to_be_bytes()); // volume (video)
    p.extend_from_slice(&0u16.to_be_bytes()); // reserved
    p.extend(identity_matrix());
    p.extend_from_slice(&(desc.coded_width << 16).to_be_bytes()); // 16.16
    p.extend_from_slice(&(desc.coded_height << 16).to_be_bytes());

    let mut out = Vec::new();
    // flags: track_enabled | track_in_movie
    push_full_box(&mut out, b"tkhd", 0, 0x000003, &p);
    out
}

fn build_mdia(desc: &CodecDescription, samples: &[SampleInfo], duration_us: u64) -> Vec<u8> {
    let mut mdia_payload = Vec::new();

    // mdhd, version 1 for a 64-bit duration in microsecond ticks.
    let mut mdhd = Vec::new();
    mdhd.extend_from_slice(&0u64.to_be_bytes()); // creation_time
    mdhd.extend_from_slice(&0u64.to_be_bytes()); // modification_time
    mdhd.extend_from_slice(&TRACK_TIMESCALE.to_be_bytes());
    mdhd.extend_from_slice(&us_to_ticks(duration_us, TRACK_TIMESCALE).to_be_bytes());
    mdhd.extend_from_slice(&0x55C4u16.to_be_bytes()); // language: und
    mdhd.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
    push_full_box(&mut mdia_payload, b"mdhd", 1, 0, &mdhd);

    // hdlr
    let mut hdlr = Vec::new();
    hdlr.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
    hdlr.extend_from_slice(b"vide");
    hdlr.extend_from_slice(&[0u8; 12]); // reserved
    hdlr.extend_from_slice(b"VideoHandler\0");
    push_full_box(&mut mdia_payload, b"hdlr", 0, 0, &hdlr);

    // minf
    let mut minf_payload = Vec::new();
    push_full_box(&mut minf_payload, b"vmhd", 0, 1, &[0u8; 8]);
    minf_payload.extend(build_dinf());
    minf_payload.extend(build_stbl(desc, samples));
    push_box(&mut mdia_payload, b"minf", &minf_payload);

    let mut out = Vec::new();
    push_box(&mut out, b"mdia", &mdia_payload);
    out
}

fn build_dinf() -> Vec<u8> {
    let mut url = Vec::new();
    // flags=1: media data in the same file
    push_full_box(&mut url, b"url ", 0, 1, &[]);

    let mut dref = Vec::new();
    dref.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    dref.extend(url);

    let mut dinf_payload = Vec::new();
    push_full_box(&mut dinf_payload, b"dref", 0, 0, &dref);

    let mut out = Vec::new();
    push_box(&mut out, b"dinf", &dinf_payload);
    out
}

fn build_stbl(desc: &CodecDescription, samples: &[SampleInfo]) -> Vec<u8> {
    let mut stbl_payload = Vec::new();
    stbl_payload.extend(build_stsd(desc));
    stbl_payload.extend(build_stts(samples));
    stbl_payload.extend(build_stss(samples));
    stbl_payload.extend(build_stsc());
    stbl_payload.extend(build_stsz(samples));
    stbl_payload.extend(build_co64(samples));

    let mut out = Vec::new();
    push_box(&mut out, b"stbl", &stbl_payload);
    out
}

fn build_stsd(desc: &CodecDescription) -> Vec<u8> {
    // Visual sample entry (avc1) with the codec-private avcC payload and
    // an nclx colour box carrying the pipeline's output convention.
    let mut entry = Vec::new();
    entry.extend_from_slice(&[0u8; 6]); // reserved
    entry.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    entry.extend_from_slice(&[0u8; 16]); // pre_defined/reserved
    entry.extend_from_slice(&(desc.coded_width as u16).to_be_bytes());
    entry.extend_from_slice(&(desc.coded_height as u16).to_be_bytes());
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // horizresolution 72dpi
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // vertresolution
    entry.extend_from_slice(&0u32.to_be_bytes()); // reserved
    entry.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    entry.extend_from_slice(&[0u8; 32]); // compressorname
    entry.extend_from_slice(&0x0018u16.to_be_bytes()); // depth 24
    entry.extend_from_slice(&(-1i16).to_be_bytes()); // pre_defined

    push_box(&mut entry, b"avcC", &desc.description_blob);
    entry.extend(build_colr(desc));

    let mut avc1 = Vec::new();
    push_box(&mut avc1, b"avc1", &entry);

    let mut stsd = Vec::new();
    stsd.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    stsd.extend(avc1);

    let mut out = Vec::new();
    push_full_box(&mut out, b"stsd", 0, 0, &stsd);
    out
}

fn build_colr(desc: &CodecDescription) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(b"nclx");
    p.extend_from_slice(&desc.color.primaries.nclx_code().to_be_bytes());
    p.extend_from_slice(&desc.color.transfer.nclx_code().to_be_bytes());
    p.extend_from_slice(&desc.color.matrix.nclx_code().to_be_bytes());
    p.push(if desc.color.full_range { 0x80 } else { 0x00 });

    let mut out = Vec::new();
    push_box(&mut out, b"colr", &p);
    out
}

fn build_stts(samples: &[SampleInfo]) -> Vec<u8> {
    // Run-length encode consecutive equal durations.
    let mut runs: Vec<(u32, u64)> = Vec::new();
    for s in samples {
        match runs.last_mut() {
            Some((count, delta)) if *delta == s.duration_us => *count += 1,
            _ => runs.push((1, s.duration_us)),
        }
    }

    let mut p = Vec::new();
    p.extend_from_slice(&(runs.len() as u32).to_be_bytes());
    for (count, delta) in runs {
        p.extend_from_slice(&count.to_be_bytes());
        p.extend_from_slice(&(us_to_ticks(delta, TRACK_TIMESCALE) as u32).to_be_bytes());
    }

    let mut out = Vec::new();
    push_full_box(&mut out, b"stts", 0, 0, &p);
    out
}

fn build_stss(samples: &[SampleInfo]) -> Vec<u8> {
    let keys: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_key)
        .map(|(i, _)| i as u32 + 1) // 1-based sample numbers
        .collect();

    let mut p = Vec::new();
    p.extend_from_slice(&(keys.len() as u32).to_be_bytes());
    for k in keys {
        p.extend_from_slice(&k.to_be_bytes());
    }

    let mut out = Vec::new();
    push_full_box(&mut out, b"stss", 0, 0, &p);
    out
}

fn build_stsc() -> Vec<u8> {
    // One sample per chunk throughout.
    let mut p = Vec::new();
    p.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    p.extend_from_slice(&1u32.to_be_bytes()); // first_chunk
    p.extend_from_slice(&1u32.to_be_bytes()); // samples_per_chunk
    p.extend_from_slice(&1u32.to_be_bytes()); // sample_description_index

    let mut out = Vec::new();
    push_full_box(&mut out, b"stsc", 0, 0, &p);
    out
}

fn build_stsz(samples: &[SampleInfo]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes()); // sample_size: 0 = per-sample
    p.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for s in samples {
        p.extend_from_slice(&s.size.to_be_bytes());
    }

    let mut out = Vec::new();
    push_full_box(&mut out, b"stsz", 0, 0, &p);
    out
}

fn build_co64(samples: &[SampleInfo]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for s in samples {
        p.extend_from_slice(&s.offset.to_be_bytes());
    }

    let mut out = Vec::new();
    push_full_box(&mut out, b"co64", 0, 0, &p);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_common::{CodecId, ColorSpaceDesc};

    fn desc() -> CodecDescription {
        CodecDescription {
            codec: CodecId::default(),
            coded_width: 1280,
            coded_height: 720,
            description_blob: vec![1, 0x64, 0x00, 0x33, 0xFF, 0xE1],
            color: ColorSpaceDesc::OUTPUT,
        }
    }

    fn sample(offset: u64, duration_us: u64, is_key: bool) -> SampleInfo {
        SampleInfo {
            offset,
            size: 100,
            duration_us,
            is_key,
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn ftyp_layout() {
        let mut out = Vec::new();
        write_ftyp(&mut out).unwrap();
        assert_eq!(&out[4..8], b"ftyp");
        assert_eq!(u32::from_be_bytes(out[0..4].try_into().unwrap()), 28);
        assert!(contains(&out, b"avc1"));
    }

    #[test]
    fn moov_contains_required_boxes() {
        let samples = vec![sample(16, 33_333, true), sample(116, 33_333, false)];
        let moov = build_moov(&desc(), &samples);
        for kind in [
            b"mvhd", b"trak", b"tkhd", b"mdia", b"mdhd", b"hdlr", b"minf", b"vmhd", b"dinf",
            b"stbl", b"stsd", b"avc1", b"avcC", b"colr", b"stts", b"stss", b"stsc", b"stsz",
            b"co64",
        ] {
            assert!(contains(&moov, kind), "missing {:?}", kind);
        }
    }

    #[test]
    fn moov_embeds_description_blob() {
        let moov = build_moov(&desc(), &[sample(16, 33_333, true)]);
        assert!(contains(&moov, &desc().description_blob));
    }

    #[test]
    fn colr_carries_output_convention() {
        let moov = build_moov(&desc(), &[sample(16, 33_333, true)]);
        // nclx: primaries=1, transfer=13, matrix=0, full-range flag set
        let nclx = [b'n', b'c', b'l', b'x', 0, 1, 0, 13, 0, 0, 0x80];
        assert!(contains(&moov, &nclx));
    }

    #[test]
    fn stts_run_length_compresses() {
        let samples = vec![
            sample(0, 40_000, true),
            sample(100, 40_000, false),
            sample(200, 40_000, false),
        ];
        let stts = build_stts(&samples);
        // entry_count 1, count 3, delta 40000
        let body = &stts[12..];
        assert_eq!(u32::from_be_bytes(body[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(body[4..8].try_into().unwrap()), 3);
        assert_eq!(u32::from_be_bytes(body[8..12].try_into().unwrap()), 40_000);
    }

    #[test]
    fn stss_lists_one_based_keyframes() {
        let samples = vec![
            sample(0, 33_333, true),
            sample(1, 33_333, false),
            sample(2, 33_333, true),
        ];
        let stss = build_stss(&samples);
        let body = &stss[12..];
        assert_eq!(u32::from_be_bytes(body[0..4].try_into().unwrap()), 2);
        assert_eq!(u32::from_be_bytes(body[4..8].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(body[8..12].try_into().unwrap()), 3);
    }
}
