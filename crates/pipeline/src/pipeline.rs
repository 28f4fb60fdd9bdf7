//! Export pipeline — drives decode, composite, encode, and mux as one
//! coordinated loop.
//!
//! # Architecture
//!
//! ```text
//! ExportPipeline::run()            (caller thread, or "export-pipeline"
//!   |                               when started through the handle API)
//!   +-- decode-worker  ── owns the SourceReader, serializes seeks,
//!   |                     feeds the bounded decode-ahead queue
//!   +-- encode-worker  ── owns the CodecBackend, emits chunks FIFO
//!   +-- mux-writer     ── owns the ContainerMuxer, drains the chunk
//!   |                     FIFO, finalizes into the blob
//!   |
//!   +-- for i in 0..total_frames:
//!         1. take the decode queue head          (suspends, cancel-aware)
//!         2. compositor.render(frame, src_ts); release frame
//!         3. CompositedFrame from the target
//!         4. encoder.submit(frame, keyframe)     (suspends on backpressure)
//!         5. top up the decode queue
//!         6. emit progress
//! ```
//!
//! Workers communicate with the loop exclusively through FIFO channels;
//! the encoder's in-flight counter is the only shared mutable state.
//! Cancellation is an atomic flag observed at every suspension point; on
//! any exit — success, failure, cancellation — each stage is torn down
//! exactly once, and cleanup errors are logged, never allowed to shadow
//! the original error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use rf_common::{
    Blob, ChunkMeta, CodedChunk, ContainerMuxer, FrameCompositor, FrameLedger, MuxError,
    SourceError, SourceReader,
};
use rf_compositor::SoftwareCompositor;
use rf_encoder::{
    ChannelSink, CodecBackendFactory, DefaultBackendFactory, VideoEncoder, GOP_LENGTH,
};
use rf_mux::Mp4Muxer;

use crate::decode::{DecodeQueue, DecodeRequest};
use crate::error::ExportError;
use crate::progress::{estimate_remaining_us, ChannelProgress, ProgressEvent, ProgressSink};
use crate::spec::ExportSpec;
use crate::timemap::TimeMap;

type SourceOpener =
    Box<dyn FnOnce(&str, Arc<FrameLedger>) -> Result<Box<dyn SourceReader>, SourceError> + Send>;
type MuxerFactory = Box<dyn FnOnce() -> Result<Box<dyn ContainerMuxer>, MuxError> + Send>;

/// Idempotent cancellation switch for a running export.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation. Safe to call repeatedly and after the run
    /// has finished.
    pub fn cancel(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("Export cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The export orchestrator. Owns every stage for the duration of `run`.
pub struct ExportPipeline {
    spec: ExportSpec,
    cancel: Arc<AtomicBool>,
    ledger: Arc<FrameLedger>,
    progress: Vec<Box<dyn ProgressSink>>,
    opener: SourceOpener,
    compositor: Box<dyn FrameCompositor>,
    muxer_factory: MuxerFactory,
    backend_factory: Arc<dyn CodecBackendFactory>,
}

impl ExportPipeline {
    /// Validate the spec and assemble a pipeline with the workspace's
    /// default collaborators.
    pub fn new(spec: ExportSpec) -> Result<Self, ExportError> {
        spec.validate()?;
        Ok(Self {
            spec,
            cancel: Arc::new(AtomicBool::new(false)),
            ledger: FrameLedger::new(),
            progress: Vec::new(),
            opener: Box::new(|uri, ledger| rf_source::open_source(uri, ledger)),
            compositor: Box::new(SoftwareCompositor::new()),
            muxer_factory: Box::new(|| {
                Mp4Muxer::new().map(|m| Box::new(m) as Box<dyn ContainerMuxer>)
            }),
            backend_factory: Arc::new(DefaultBackendFactory),
        })
    }

    /// Attach a progress observer. Multiple sinks all receive every event.
    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress.push(Box::new(sink));
        self
    }

    /// Replace the source opener (alternative readers, tests).
    pub fn with_source_opener(
        mut self,
        opener: impl FnOnce(&str, Arc<FrameLedger>) -> Result<Box<dyn SourceReader>, SourceError>
            + Send
            + 'static,
    ) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Replace the compositor.
    pub fn with_compositor(mut self, compositor: impl FrameCompositor + 'static) -> Self {
        self.compositor = Box::new(compositor);
        self
    }

    /// Replace the muxer factory (alternative containers, stub muxers).
    pub fn with_muxer_factory(
        mut self,
        factory: impl FnOnce() -> Result<Box<dyn ContainerMuxer>, MuxError> + Send + 'static,
    ) -> Self {
        self.muxer_factory = Box::new(factory);
        self
    }

    /// Replace the codec backend factory.
    pub fn with_backend_factory(mut self, factory: impl CodecBackendFactory + 'static) -> Self {
        self.backend_factory = Arc::new(factory);
        self
    }

    /// Handle for cancelling this export from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// The run's frame ledger (lifetime accounting over both frame kinds).
    pub fn ledger(&self) -> Arc<FrameLedger> {
        Arc::clone(&self.ledger)
    }

    /// Run the export to completion on the calling thread.
    pub fn run(self) -> Result<Blob, ExportError> {
        let ExportPipeline {
            spec,
            cancel,
            ledger,
            mut progress,
            opener,
            mut compositor,
            muxer_factory,
            backend_factory,
        } = self;

        let started = Instant::now();
        info!(
            uri = %spec.source_uri,
            codec = %spec.codec,
            resolution = %spec.resolution(),
            fps = %spec.frame_rate,
            "Export starting"
        );

        let mut stages = Stages::default();
        let result = drive(
            &spec,
            &cancel,
            &ledger,
            &mut progress,
            opener,
            compositor.as_mut(),
            muxer_factory,
            backend_factory.as_ref(),
            &mut stages,
            started,
        );

        // Cleanup runs on every path; stages already consumed by the
        // success path are no-ops here.
        stages.teardown();
        compositor.destroy();

        let stats = ledger.stats();
        if ledger.live() != 0 {
            warn!(?stats, "Frame ledger nonzero after teardown");
        }
        match &result {
            Ok(blob) => info!(
                bytes = blob.len(),
                decoded = stats.decoded_total,
                composited = stats.composited_total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Export finished"
            ),
            Err(err) => info!(%err, "Export did not complete"),
        }
        result
    }

    /// Spawn the export on a worker thread and return a handle for
    /// progress, cancellation, and the final result.
    pub fn start(mut self) -> Result<ExportHandle, ExportError> {
        let (progress_tx, progress_rx) = channel::bounded::<ProgressEvent>(256);
        self.progress.push(Box::new(ChannelProgress(progress_tx)));

        let cancel = self.cancel_handle();
        let ledger = self.ledger();
        let thread = thread::Builder::new()
            .name("export-pipeline".to_string())
            .spawn(move || self.run())
            .map_err(|e| ExportError::Worker(format!("failed to spawn export thread: {e}")))?;

        Ok(ExportHandle {
            progress_rx,
            cancel,
            ledger,
            thread: Some(thread),
        })
    }
}

/// Handle to an export running on its own thread.
pub struct ExportHandle {
    progress_rx: Receiver<ProgressEvent>,
    cancel: CancelHandle,
    ledger: Arc<FrameLedger>,
    thread: Option<JoinHandle<Result<Blob, ExportError>>>,
}

impl ExportHandle {
    /// Request cancellation. Idempotent; a no-op after completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn ledger(&self) -> Arc<FrameLedger> {
        Arc::clone(&self.ledger)
    }

    /// Latest progress, non-blocking.
    pub fn try_recv_progress(&self) -> Option<ProgressEvent> {
        self.progress_rx.try_recv().ok()
    }

    /// Next progress event, blocking; `None` once the run is over.
    pub fn recv_progress(&self) -> Option<ProgressEvent> {
        self.progress_rx.recv().ok()
    }

    /// Drain all pending progress events.
    pub fn drain_progress(&self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = self.progress_rx.try_recv() {
            events.push(ev);
        }
        events
    }

    /// Wait for the export to finish and take its result.
    pub fn join(mut self) -> Result<Blob, ExportError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ExportError::Worker("export thread panicked".to_string()))?,
            None => Err(ExportError::Worker("export already joined".to_string())),
        }
    }
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.cancel.cancel();
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Stages & teardown
// ---------------------------------------------------------------------------

/// Live pipeline stages. Teardown releases each exactly once, in
/// dependency order, and never propagates cleanup errors.
#[derive(Default)]
struct Stages {
    decode: Option<DecodeQueue>,
    encoder: Option<VideoEncoder>,
    mux: Option<MuxWorker>,
}

impl Stages {
    fn teardown(&mut self) {
        // Encoder first: closing it ends the encode worker, which drops
        // its sender into the chunk FIFO so the mux worker can exit.
        if let Some(mut encoder) = self.encoder.take() {
            encoder.close();
        }
        if let Some(mux) = self.mux.take() {
            mux.abort();
        }
        if let Some(mut decode) = self.decode.take() {
            decode.shutdown();
        }
    }
}

/// The mux-writer thread: drains the chunk FIFO into the muxer and
/// finalizes once every sender is gone.
struct MuxWorker {
    chunk_tx: Option<Sender<(CodedChunk, ChunkMeta)>>,
    thread: Option<JoinHandle<Result<Blob, MuxError>>>,
}

impl MuxWorker {
    fn spawn(muxer: Box<dyn ContainerMuxer>, cancel: Arc<AtomicBool>) -> Result<Self, ExportError> {
        let (chunk_tx, chunk_rx) = channel::unbounded::<(CodedChunk, ChunkMeta)>();
        let thread = thread::Builder::new()
            .name("mux-writer".to_string())
            .spawn(move || run_mux(muxer, chunk_rx, cancel))
            .map_err(|e| ExportError::Worker(format!("failed to spawn mux worker: {e}")))?;
        Ok(Self {
            chunk_tx: Some(chunk_tx),
            thread: Some(thread),
        })
    }

    fn sender(&self) -> Sender<(CodedChunk, ChunkMeta)> {
        self.chunk_tx
            .clone()
            .expect("mux worker sender taken before teardown")
    }

    /// Close the FIFO, wait for the drain, and take the finalized blob.
    fn finish(mut self) -> Result<Blob, ExportError> {
        self.chunk_tx = None;
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(result) => result.map_err(ExportError::from),
                Err(_) => Err(ExportError::Worker("mux worker panicked".to_string())),
            },
            None => Err(ExportError::Worker("mux worker already finished".to_string())),
        }
    }

    /// Teardown path: stop without taking a blob; errors are expected
    /// here (cancelled runs) and only logged.
    fn abort(mut self) {
        self.chunk_tx = None;
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(Ok(_)) | Ok(Err(_)) => {}
                Err(_) => warn!("Mux worker panicked during teardown"),
            }
        }
    }
}

fn run_mux(
    mut muxer: Box<dyn ContainerMuxer>,
    chunk_rx: Receiver<(CodedChunk, ChunkMeta)>,
    cancel: Arc<AtomicBool>,
) -> Result<Blob, MuxError> {
    for (chunk, meta) in chunk_rx {
        muxer.add_chunk(&chunk, &meta)?;
    }
    if cancel.load(Ordering::SeqCst) {
        // Cancelled exports never yield a partial blob.
        return Err(MuxError::MuxFailed("export cancelled before finalize".to_string()));
    }
    muxer.finalize()
}

// ---------------------------------------------------------------------------
// The drive loop
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn drive(
    spec: &ExportSpec,
    cancel: &Arc<AtomicBool>,
    ledger: &Arc<FrameLedger>,
    progress: &mut [Box<dyn ProgressSink>],
    opener: SourceOpener,
    compositor: &mut dyn FrameCompositor,
    muxer_factory: MuxerFactory,
    backend_factory: &dyn CodecBackendFactory,
    stages: &mut Stages,
    started: Instant,
) -> Result<Blob, ExportError> {
    // 1. Open the source and size the output timeline.
    let reader = opener(&spec.source_uri, Arc::clone(ledger))?;
    let source_info = reader.info();
    let timemap = TimeMap::new(spec.frame_rate, &spec.trims);
    let total_frames = timemap
        .total_frames(source_info.duration_us)
        .map_err(|e| ExportError::InvalidSpec(e.to_string()))?;
    let period_us = timemap.frame_period_us();

    let decode = stages.decode.insert(DecodeQueue::spawn(reader)?);
    if total_frames == 0 {
        return Err(ExportError::EmptyOutput);
    }
    info!(
        total_frames,
        source_duration_us = source_info.duration_us,
        trims = timemap.trims().len(),
        period_us,
        "Export timeline computed"
    );

    // 2. Initialize compositor, muxer, encoder.
    compositor.init(&spec.render_config(source_info.resolution()))?;
    let mux = stages
        .mux
        .insert(MuxWorker::spawn(muxer_factory()?, Arc::clone(cancel))?);
    let chunk_sink = ChannelSink(mux.sender());

    let encoder = stages.encoder.insert(VideoEncoder::new(Arc::clone(cancel)));
    encoder.configure(&spec.encoder_config(), backend_factory, Box::new(chunk_sink))?;

    // 3.–4. Prefill the decode-ahead queue.
    let make_request = |index: u64| {
        let eff_ts_us = index * period_us;
        DecodeRequest {
            frame_index: index,
            eff_ts_us,
            src_ts_us: timemap.source_time_of(eff_ts_us),
        }
    };
    let mut next_decode: u64 = 0;
    while next_decode < total_frames.min(crate::decode::DECODE_AHEAD as u64) {
        decode.request(make_request(next_decode));
        next_decode += 1;
    }

    // 5. Main loop.
    let mut cancelled = false;
    for i in 0..total_frames {
        // (a) Await the decode queue head.
        let Some(slot) = decode.next(cancel)? else {
            cancelled = true;
            break;
        };

        // (b) Render, then release the decoded frame.
        compositor.render(&slot.frame, slot.src_ts_us)?;
        let eff_ts_us = slot.eff_ts_us;
        drop(slot);

        // (c) Snapshot the target into a composited frame. No suspension
        // between render and submit-enqueue: the target stays valid.
        let composited =
            rf_common::CompositedFrame::from_target(compositor.target()?, eff_ts_us, period_us, ledger);

        // (d)–(e) Submit under backpressure; a forced keyframe every
        // GOP_LENGTH frames.
        match encoder.submit(composited, i.is_multiple_of(GOP_LENGTH)) {
            Ok(rf_encoder::Submit::Accepted) => {}
            Ok(rf_encoder::Submit::Cancelled) => {
                cancelled = true;
                break;
            }
            Err(err) => return Err(fail_with_mux_context(stages, err.into())),
        }

        // (f) Keep the decode-ahead queue topped up.
        if next_decode < total_frames {
            decode.request(make_request(next_decode));
            next_decode += 1;
        }

        // (g) Progress.
        let done = i + 1;
        let event = ProgressEvent::new(
            done,
            total_frames,
            estimate_remaining_us(done, total_frames, started.elapsed()),
        );
        for sink in progress.iter_mut() {
            sink.emit(event);
        }
        debug!(frame = done, total = total_frames, "Frame submitted");

        // (h) Cancellation between frames.
        if cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
    }

    if cancelled {
        info!("Export cancelled mid-run");
        return Err(ExportError::Cancelled);
    }

    // 6. Drain the encoder, then the mux FIFO, then finalize.
    if let Err(err) = encoder.flush() {
        return Err(fail_with_mux_context(stages, err.into()));
    }
    if let Some(mut encoder) = stages.encoder.take() {
        encoder.close();
    }
    let blob = match stages.mux.take() {
        Some(mux) => mux.finish()?,
        None => return Err(ExportError::Worker("mux stage missing".to_string())),
    };
    Ok(blob)
}

/// An encode-path failure is often a symptom of the mux writer dying
/// underneath it (its chunk FIFO closes, the encoder reports a rejected
/// sink). Close the encoder, join the writer, and prefer the writer's own
/// error when it has one; otherwise keep the encoder's.
fn fail_with_mux_context(stages: &mut Stages, fallback: ExportError) -> ExportError {
    if let Some(mut encoder) = stages.encoder.take() {
        encoder.close();
    }
    if let Some(mux) = stages.mux.take() {
        if let Err(err) = mux.finish() {
            warn!(%err, "Mux writer failed alongside the encoder");
            return err;
        }
    }
    fallback
}
