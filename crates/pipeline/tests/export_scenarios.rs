//! End-to-end export scenarios over synthetic sources.
//!
//! These exercise the full decode → composite → encode → mux path with a
//! recording muxer wrapped around the real MP4 muxer, so chunk-level
//! properties (timestamps, ordering, keyframe placement, description
//! attachment) are observable alongside the final blob.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use rf_common::{
    Acceleration, Blob, ChunkMeta, CodedChunk, ContainerMuxer, DecodedFrame, EncodeError,
    EncoderConfig, MuxError, SourceError, SourceReader, TimeInterval, TrimSet,
};
use rf_encoder::{CodecBackend, CodecBackendFactory, SoftwareAvcBackend};
use rf_mux::Mp4Muxer;
use rf_pipeline::{ExportError, ExportPipeline, ExportSpec};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// One recorded `add_chunk` call.
#[derive(Clone, Debug)]
struct ChunkRecord {
    pts_us: u64,
    duration_us: u64,
    is_key: bool,
    had_description: bool,
}

type ChunkLog = Arc<Mutex<Vec<ChunkRecord>>>;

/// Muxer wrapper recording every chunk before delegating to the real one.
struct RecordingMuxer {
    inner: Box<dyn ContainerMuxer>,
    log: ChunkLog,
}

impl RecordingMuxer {
    fn factory(log: ChunkLog) -> impl FnOnce() -> Result<Box<dyn ContainerMuxer>, MuxError> + Send {
        move || {
            Ok(Box::new(RecordingMuxer {
                inner: Box::new(Mp4Muxer::new()?),
                log,
            }) as Box<dyn ContainerMuxer>)
        }
    }
}

impl ContainerMuxer for RecordingMuxer {
    fn add_chunk(&mut self, chunk: &CodedChunk, meta: &ChunkMeta) -> Result<(), MuxError> {
        self.log.lock().push(ChunkRecord {
            pts_us: chunk.pts_us,
            duration_us: chunk.duration_us,
            is_key: chunk.is_key,
            had_description: meta.description.is_some(),
        });
        self.inner.add_chunk(chunk, meta)
    }

    fn finalize(self: Box<Self>) -> Result<Blob, MuxError> {
        let RecordingMuxer { inner, .. } = *self;
        inner.finalize()
    }
}

fn spec(uri: &str, width: u32, height: u32, fps: rf_common::Rational) -> ExportSpec {
    ExportSpec {
        width,
        height,
        frame_rate: fps,
        bitrate_bps: 1_000_000,
        source_uri: uri.to_string(),
        ..Default::default()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Identity remap, no trims
// ---------------------------------------------------------------------------

#[test]
fn export_without_trims_is_identity_remap() {
    let log: ChunkLog = Default::default();
    let pipeline = ExportPipeline::new(spec(
        "synth:smpte?dur=3000000&w=1280&h=720&fps=30",
        1280,
        720,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log)));
    let ledger = pipeline.ledger();

    let blob = pipeline.run().unwrap();

    let chunks = log.lock();
    assert_eq!(chunks.len(), 90);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.pts_us, i as u64 * 33_333, "pts of chunk {i}");
        assert_eq!(c.duration_us, 33_333);
    }
    // Strictly increasing pts (order preservation).
    assert!(chunks.windows(2).all(|w| w[0].pts_us < w[1].pts_us));
    // Keyframes: the software codec's one-second cadence puts sync
    // samples at 0, 30, 60; the first chunk is always a keyframe.
    let keys: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_key)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(keys, vec![0, 30, 60]);

    assert_eq!(&blob[4..8], b"ftyp");
    assert!(contains(&blob, b"moov"));
    assert_eq!(ledger.live(), 0);
}

// ---------------------------------------------------------------------------
// Single interior trim
// ---------------------------------------------------------------------------

#[test]
fn interior_trim_shortens_output() {
    let log: ChunkLog = Default::default();
    let mut s = spec(
        "synth:gradient?dur=10000000&w=320&h=180&fps=25",
        320,
        180,
        rf_common::Rational::FPS_25,
    );
    s.trims = TrimSet::new(vec![TimeInterval::new(3_000_000, 5_000_000)]);

    let pipeline = ExportPipeline::new(s)
        .unwrap()
        .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log)));
    let ledger = pipeline.ledger();

    pipeline.run().unwrap();

    let chunks = log.lock();
    // 8s effective at 25fps.
    assert_eq!(chunks.len(), 200);
    assert_eq!(chunks[0].pts_us, 0);
    assert_eq!(chunks[199].pts_us, 199 * 40_000);
    assert!(chunks.iter().all(|c| c.duration_us == 40_000));
    assert_eq!(ledger.live(), 0);
}

// ---------------------------------------------------------------------------
// Cancellation mid-run
// ---------------------------------------------------------------------------

/// Reader wrapper that slows decoding down so cancellation deterministically
/// lands mid-run.
#[derive(Debug)]
struct SlowReader {
    inner: Box<dyn SourceReader>,
    delay: Duration,
}

impl SourceReader for SlowReader {
    fn info(&self) -> rf_common::SourceInfo {
        self.inner.info()
    }

    fn frame_at(&mut self, src_ts_us: u64) -> Result<DecodedFrame, SourceError> {
        thread::sleep(self.delay);
        self.inner.frame_at(src_ts_us)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[test]
fn cancellation_mid_run_yields_cancelled() {
    let pipeline = ExportPipeline::new(spec(
        "synth:checker?dur=8000000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_source_opener(|uri, ledger| {
        Ok(Box::new(SlowReader {
            inner: rf_source::open_source(uri, ledger)?,
            delay: Duration::from_millis(2),
        }))
    });
    let ledger = pipeline.ledger();

    let handle = pipeline.start().unwrap();
    // Watch progress until frame 60 lands, then cancel.
    loop {
        match handle.recv_progress() {
            Some(ev) if ev.current_frame >= 60 => break,
            Some(_) => continue,
            None => panic!("export finished before reaching frame 60"),
        }
    }
    handle.cancel();
    handle.cancel(); // idempotent

    let cancel = handle.cancel_handle();
    let result = handle.join();
    assert!(matches!(result, Err(ExportError::Cancelled)));

    // Post-conditions: cancelling again is a no-op, and no frame leaked.
    cancel.cancel();
    assert_eq!(ledger.live(), 0);
}

#[test]
fn cancel_after_completion_is_noop() {
    let pipeline = ExportPipeline::new(spec(
        "synth:checker?dur=500000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap();
    let cancel = pipeline.cancel_handle();
    let ledger = pipeline.ledger();

    let blob = pipeline.run().unwrap();
    assert!(!blob.is_empty());
    cancel.cancel();
    cancel.cancel();
    assert_eq!(ledger.live(), 0);
}

#[test]
fn dropped_handle_cancels_and_joins() {
    let pipeline = ExportPipeline::new(spec(
        "synth:checker?dur=60000000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_source_opener(|uri, ledger| {
        Ok(Box::new(SlowReader {
            inner: rf_source::open_source(uri, ledger)?,
            delay: Duration::from_millis(2),
        }))
    });
    let handle = pipeline.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(handle); // must not hang
}

// ---------------------------------------------------------------------------
// Hardware fallback
// ---------------------------------------------------------------------------

/// Factory on a machine whose "hardware" path always declines.
struct NoHardware;

impl CodecBackendFactory for NoHardware {
    fn supports(&self, config: &EncoderConfig, accel: Acceleration) -> bool {
        match accel {
            Acceleration::PreferHardware => false,
            Acceleration::PreferSoftware => SoftwareAvcBackend::supports(&config.codec),
        }
    }

    fn create(
        &self,
        config: &EncoderConfig,
        accel: Acceleration,
    ) -> Result<Box<dyn CodecBackend>, EncodeError> {
        assert_eq!(
            accel.label(),
            "prefer-software",
            "pipeline must fall back to software"
        );
        Ok(Box::new(SoftwareAvcBackend::new(config.clone())?))
    }
}

#[test]
fn hardware_fallback_still_satisfies_stream_properties() {
    let log: ChunkLog = Default::default();
    let pipeline = ExportPipeline::new(spec(
        "synth:smpte?dur=2000000&w=128&h=72&fps=30",
        128,
        72,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_backend_factory(NoHardware)
    .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log)));

    let blob = pipeline.run().unwrap();
    assert!(!blob.is_empty());

    let chunks = log.lock();
    assert_eq!(chunks.len(), 60);
    // Exact timestamps, strict ordering, keyframe at 0.
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.pts_us, i as u64 * 33_333);
    }
    assert!(chunks.windows(2).all(|w| w[0].pts_us < w[1].pts_us));
    assert!(chunks[0].is_key);
}

// ---------------------------------------------------------------------------
// First-chunk metadata required
// ---------------------------------------------------------------------------

/// Stub muxer that rejects any chunk whose metadata lacks a description
/// and returns a marker blob at finalize.
struct StrictStubMuxer {
    chunks: u64,
}

impl ContainerMuxer for StrictStubMuxer {
    fn add_chunk(&mut self, _chunk: &CodedChunk, meta: &ChunkMeta) -> Result<(), MuxError> {
        let desc = meta
            .description
            .as_ref()
            .ok_or(MuxError::MissingCodecDescription)?;
        if desc.description_blob.is_empty() {
            return Err(MuxError::MissingCodecDescription);
        }
        self.chunks += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Blob, MuxError> {
        Ok(self.chunks.to_be_bytes().to_vec())
    }
}

#[test]
fn strict_muxer_accepts_reattached_descriptions() {
    let pipeline = ExportPipeline::new(spec(
        "synth:gradient?dur=1000000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_muxer_factory(|| Ok(Box::new(StrictStubMuxer { chunks: 0 }) as Box<dyn ContainerMuxer>));

    // The stub rejects chunks without descriptions; success means the
    // session attached the captured description to every forwarded chunk.
    let blob = pipeline.run().unwrap();
    assert_eq!(blob, 30u64.to_be_bytes().to_vec());
}

#[test]
fn every_muxed_chunk_carries_description() {
    let log: ChunkLog = Default::default();
    let pipeline = ExportPipeline::new(spec(
        "synth:gradient?dur=1000000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap()
    .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log)));
    pipeline.run().unwrap();

    let chunks = log.lock();
    assert_eq!(chunks.len(), 30);
    assert!(chunks.iter().all(|c| c.had_description));
}

// ---------------------------------------------------------------------------
// Error paths
// ---------------------------------------------------------------------------

#[test]
fn invalid_spec_fails_before_running() {
    let mut s = spec("synth:smpte", 1280, 720, rf_common::Rational::FPS_30);
    s.width = 1281;
    assert!(matches!(
        ExportPipeline::new(s),
        Err(ExportError::InvalidSpec(_))
    ));
}

#[test]
fn unknown_source_scheme_fails() {
    let pipeline = ExportPipeline::new(spec(
        "gopher:clip.mp4",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap();
    let ledger = pipeline.ledger();
    assert!(matches!(
        pipeline.run(),
        Err(ExportError::Source(SourceError::SourceUnavailable(_)))
    ));
    assert_eq!(ledger.live(), 0);
}

#[test]
fn unsupported_codec_fails_cleanly() {
    let mut s = spec(
        "synth:smpte?dur=1000000&w=64&h=36",
        64,
        36,
        rf_common::Rational::FPS_30,
    );
    s.codec = rf_common::CodecId::new("av01.0.04M.08");
    let pipeline = ExportPipeline::new(s).unwrap();
    let ledger = pipeline.ledger();
    assert!(matches!(
        pipeline.run(),
        Err(ExportError::Encode(EncodeError::CodecUnsupported(_)))
    ));
    assert_eq!(ledger.live(), 0);
}

#[test]
fn trims_consuming_source_fail_as_empty_output() {
    let mut s = spec(
        "synth:smpte?dur=2000000&w=64&h=36",
        64,
        36,
        rf_common::Rational::FPS_30,
    );
    s.trims = TrimSet::new(vec![TimeInterval::new(0, 2_000_000)]);
    let pipeline = ExportPipeline::new(s).unwrap();
    assert!(matches!(pipeline.run(), Err(ExportError::EmptyOutput)));
}

#[test]
fn trims_exceeding_source_fail_as_invalid_spec() {
    let mut s = spec(
        "synth:smpte?dur=2000000&w=64&h=36",
        64,
        36,
        rf_common::Rational::FPS_30,
    );
    s.trims = TrimSet::new(vec![TimeInterval::new(0, 3_000_000)]);
    let pipeline = ExportPipeline::new(s).unwrap();
    assert!(matches!(pipeline.run(), Err(ExportError::InvalidSpec(_))));
}

// ---------------------------------------------------------------------------
// Determinism & progress
// ---------------------------------------------------------------------------

#[test]
fn identical_specs_produce_identical_blobs() {
    let make = || {
        ExportPipeline::new(spec(
            "synth:gradient?dur=1500000&w=64&h=36&fps=30",
            64,
            36,
            rf_common::Rational::FPS_30,
        ))
        .unwrap()
        .run()
        .unwrap()
    };
    assert_eq!(make(), make());
}

#[test]
fn progress_counts_every_frame() {
    let pipeline = ExportPipeline::new(spec(
        "synth:checker?dur=1000000&w=64&h=36&fps=30",
        64,
        36,
        rf_common::Rational::FPS_30,
    ))
    .unwrap();
    let handle = pipeline.start().unwrap();

    let mut events = Vec::new();
    while let Some(ev) = handle.recv_progress() {
        events.push(ev);
    }
    let blob = handle.join().unwrap();
    assert!(!blob.is_empty());

    assert_eq!(events.len(), 30);
    assert_eq!(events[0].current_frame, 1);
    assert_eq!(events[29].current_frame, 30);
    assert!((events[29].fraction - 1.0).abs() < 1e-12);
    assert!(events.iter().all(|e| e.total_frames == 30));
}

#[test]
fn trimmed_export_skips_trimmed_content() {
    // Render the same clip twice: once whole, once with a trim. The trim
    // shortens the output by exactly the trimmed span while the surviving
    // frames keep the dense output timing.
    let log_a: ChunkLog = Default::default();
    let log_b: ChunkLog = Default::default();
    let uri = "synth:gradient?dur=6000000&w=64&h=36&fps=30";

    let a = ExportPipeline::new(spec(uri, 64, 36, rf_common::Rational::FPS_30))
        .unwrap()
        .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log_a)));
    a.run().unwrap();

    let mut s = spec(uri, 64, 36, rf_common::Rational::FPS_30);
    s.trims = TrimSet::new(vec![TimeInterval::new(3_000_000, 4_000_000)]);
    let b = ExportPipeline::new(s)
        .unwrap()
        .with_muxer_factory(RecordingMuxer::factory(Arc::clone(&log_b)));
    b.run().unwrap();

    let a = log_a.lock();
    let b = log_b.lock();
    assert_eq!(a.len(), 180);
    assert_eq!(b.len(), 150);
    // Same dense output timing in both.
    assert!(b.iter().enumerate().all(|(i, c)| c.pts_us == i as u64 * 33_333));
}
