//! Encoder session — state machine, submission-order chunk delivery, and
//! in-flight backpressure.
//!
//! The session drives a [`CodecBackend`] on a dedicated `encode-worker`
//! thread. Submissions travel over a FIFO channel and chunks leave through
//! a [`ChunkSink`] in the same order, so downstream consumers observe
//! strictly increasing timestamps. The only state shared across threads is
//! the `in_flight` counter (frames submitted minus chunks emitted), an
//! atomic paired with a condvar: `submit` blocks while the counter sits at
//! [`MAX_IN_FLIGHT`], which is the pipeline's sole guard against unbounded
//! frame-queue growth.
//!
//! State machine: `Unconfigured -> Configured -> {Flushing -> Closed | Closed}`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use rf_common::{
    Acceleration, ChunkMeta, CodecDescription, CodedChunk, CompositedFrame, EncodeError,
    EncoderConfig,
};

use crate::backend::{select_backend, CodecBackend, CodecBackendFactory};

/// Forced-keyframe spacing in frames. Fixed policy, independent of the
/// frame rate.
pub const GOP_LENGTH: u64 = 150;

/// Ceiling on frames submitted but not yet emitted as chunks.
pub const MAX_IN_FLIGHT: u64 = 120;

/// How long a blocked `submit` sleeps between checks of the cancel flag
/// and the failure slot.
const GATE_POLL: Duration = Duration::from_millis(10);

/// Receives encoded chunks in submission order.
pub trait ChunkSink: Send {
    fn on_chunk(&mut self, chunk: CodedChunk, meta: ChunkMeta) -> Result<(), EncodeError>;
}

/// Sink forwarding chunks into a crossbeam FIFO.
pub struct ChannelSink(pub Sender<(CodedChunk, ChunkMeta)>);

impl ChunkSink for ChannelSink {
    fn on_chunk(&mut self, chunk: CodedChunk, meta: ChunkMeta) -> Result<(), EncodeError> {
        self.0
            .send((chunk, meta))
            .map_err(|_| EncodeError::SinkClosed("chunk receiver dropped".to_string()))
    }
}

/// Outcome of a submit call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// The cancel flag was raised while waiting for capacity; the frame
    /// was released without being encoded.
    Cancelled,
}

/// Session statistics snapshot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncoderStats {
    pub frames_submitted: u64,
    pub chunks_emitted: u64,
    pub keyframes: u64,
    pub bytes_out: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Unconfigured,
    Configured,
    Flushing,
    Closed,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Flushing => "flushing",
            Self::Closed => "closed",
        }
    }
}

enum Job {
    Frame {
        frame: CompositedFrame,
        keyframe: bool,
    },
    Flush {
        ack: Sender<()>,
    },
}

struct Shared {
    in_flight: AtomicU64,
    gate: Mutex<()>,
    gate_cond: Condvar,
    failed: AtomicBool,
    error: Mutex<Option<EncodeError>>,
    chunks_emitted: AtomicU64,
    keyframes: AtomicU64,
    bytes_out: AtomicU64,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicU64::new(0),
            gate: Mutex::new(()),
            gate_cond: Condvar::new(),
            failed: AtomicBool::new(false),
            error: Mutex::new(None),
            chunks_emitted: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        })
    }

    fn record_error(&self, err: EncodeError) {
        error!(%err, "Encode worker failed");
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.failed.store(true, Ordering::SeqCst);
        drop(slot);
        let _guard = self.gate.lock();
        self.gate_cond.notify_all();
    }

    fn stored_error(&self) -> EncodeError {
        let slot = self.error.lock();
        match slot.as_ref() {
            Some(err) => EncodeError::EncoderFailed(err.to_string()),
            None => EncodeError::EncoderFailed("encode worker terminated".to_string()),
        }
    }

    fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _guard = self.gate.lock();
        self.gate_cond.notify_all();
    }
}

/// Observation handle for the in-flight counter (used by tests and
/// diagnostics; sampling never blocks the session).
#[derive(Clone)]
pub struct InFlightProbe(Arc<Shared>);

impl InFlightProbe {
    pub fn get(&self) -> u64 {
        self.0.in_flight.load(Ordering::SeqCst)
    }
}

/// The encoder front-end the pipeline owns.
pub struct VideoEncoder {
    state: State,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
    job_tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    acceleration: Option<Acceleration>,
    submitted: u64,
}

impl VideoEncoder {
    /// Create an unconfigured session. `cancel` is observed while waiting
    /// for capacity.
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self {
            state: State::Unconfigured,
            shared: Shared::new(),
            cancel,
            job_tx: None,
            worker: None,
            acceleration: None,
            submitted: 0,
        }
    }

    /// Select a backend (hardware preference first, software fallback) and
    /// spawn the encode worker.
    pub fn configure(
        &mut self,
        config: &EncoderConfig,
        factory: &dyn CodecBackendFactory,
        sink: Box<dyn ChunkSink>,
    ) -> Result<(), EncodeError> {
        self.expect_state(State::Unconfigured)?;

        let (backend, accel) = select_backend(factory, config)?;
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let shared = Arc::clone(&self.shared);
        let cancel = Arc::clone(&self.cancel);

        let worker = thread::Builder::new()
            .name("encode-worker".to_string())
            .spawn(move || run_worker(backend, sink, job_rx, shared, cancel))
            .map_err(|e| EncodeError::EncoderFailed(format!("failed to spawn worker: {e}")))?;

        self.job_tx = Some(job_tx);
        self.worker = Some(worker);
        self.acceleration = Some(accel);
        self.state = State::Configured;
        info!(
            codec = %config.codec,
            acceleration = accel.label(),
            "Encoder configured"
        );
        Ok(())
    }

    /// Acceleration actually selected at configure time.
    pub fn acceleration(&self) -> Option<Acceleration> {
        self.acceleration
    }

    /// Frames submitted minus chunks emitted.
    pub fn in_flight(&self) -> u64 {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight_probe(&self) -> InFlightProbe {
        InFlightProbe(Arc::clone(&self.shared))
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_submitted: self.submitted,
            chunks_emitted: self.shared.chunks_emitted.load(Ordering::Relaxed),
            keyframes: self.shared.keyframes.load(Ordering::Relaxed),
            bytes_out: self.shared.bytes_out.load(Ordering::Relaxed),
        }
    }

    /// Enqueue a frame, blocking while the in-flight count is at
    /// [`MAX_IN_FLIGHT`]. Every [`GOP_LENGTH`]-th submission is forced to
    /// a keyframe regardless of `force_keyframe`.
    pub fn submit(
        &mut self,
        frame: CompositedFrame,
        force_keyframe: bool,
    ) -> Result<Submit, EncodeError> {
        self.expect_state(State::Configured)?;

        // Backpressure gate: wait until a slot frees, the worker fails,
        // or the export is cancelled.
        {
            let mut guard = self.shared.gate.lock();
            loop {
                if self.shared.failed.load(Ordering::SeqCst) {
                    return Err(self.shared.stored_error());
                }
                if self.cancel.load(Ordering::SeqCst) {
                    return Ok(Submit::Cancelled);
                }
                if self.shared.in_flight.load(Ordering::SeqCst) < MAX_IN_FLIGHT {
                    break;
                }
                self.shared
                    .gate_cond
                    .wait_for(&mut guard, GATE_POLL);
            }
        }

        let keyframe = force_keyframe || self.submitted.is_multiple_of(GOP_LENGTH);
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(EncodeError::InvalidState {
                state: self.state.name(),
                required: "configured",
            });
        };

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if job_tx.send(Job::Frame { frame, keyframe }).is_err() {
            self.shared.dec_in_flight();
            return Err(self.shared.stored_error());
        }
        self.submitted += 1;
        Ok(Submit::Accepted)
    }

    /// Drain the backend: every submitted frame has been emitted as a
    /// chunk when this returns.
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.expect_state(State::Configured)?;
        self.state = State::Flushing;

        let (ack_tx, ack_rx) = channel::bounded::<()>(1);
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(self.shared.stored_error());
        };
        if job_tx.send(Job::Flush { ack: ack_tx }).is_err() {
            return Err(self.shared.stored_error());
        }
        if ack_rx.recv().is_err() {
            return Err(self.shared.stored_error());
        }
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(self.shared.stored_error());
        }
        debug!(
            in_flight = self.in_flight(),
            submitted = self.submitted,
            "Encoder flushed"
        );
        Ok(())
    }

    /// Stop the worker and release the backend. Idempotent; skipping
    /// `flush` beforehand discards queued frames (the cancellation path).
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.job_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let stats = self.stats();
        info!(
            frames = stats.frames_submitted,
            chunks = stats.chunks_emitted,
            keyframes = stats.keyframes,
            bytes = stats.bytes_out,
            "Encoder closed"
        );
        self.state = State::Closed;
    }

    fn expect_state(&self, required: State) -> Result<(), EncodeError> {
        if self.state == required {
            Ok(())
        } else {
            Err(EncodeError::InvalidState {
                state: self.state.name(),
                required: required.name(),
            })
        }
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mut backend: Box<dyn CodecBackend>,
    mut sink: Box<dyn ChunkSink>,
    job_rx: Receiver<Job>,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
) {
    let mut captured: Option<Arc<CodecDescription>> = None;

    for job in job_rx {
        match job {
            Job::Frame { frame, keyframe } => {
                if shared.failed.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                    // Keep draining so a blocked submitter wakes up;
                    // dropping the frame releases it without encoding
                    // (cancelled exports discard queued output).
                    shared.dec_in_flight();
                    continue;
                }
                match backend.encode(&frame, keyframe) {
                    Ok((chunk, meta)) => {
                        drop(frame);
                        let meta = reattach_description(meta, &mut captured);
                        emit(&mut sink, chunk, meta, &shared);
                    }
                    Err(err) => shared.record_error(err),
                }
                shared.dec_in_flight();
            }
            Job::Flush { ack } => {
                if !shared.failed.load(Ordering::SeqCst) {
                    match backend.flush() {
                        Ok(tail) => {
                            for (chunk, meta) in tail {
                                let meta = reattach_description(meta, &mut captured);
                                emit(&mut sink, chunk, meta, &shared);
                            }
                        }
                        Err(err) => shared.record_error(err),
                    }
                }
                let _ = ack.send(());
            }
        }
    }
}

/// Capture the codec description from the first chunk that carries one and
/// re-attach it to every chunk whose metadata omits it.
fn reattach_description(
    mut meta: ChunkMeta,
    captured: &mut Option<Arc<CodecDescription>>,
) -> ChunkMeta {
    match (&meta.description, captured.as_ref()) {
        (Some(desc), _) => *captured = Some(Arc::clone(desc)),
        (None, Some(desc)) => meta.description = Some(Arc::clone(desc)),
        (None, None) => {}
    }
    meta
}

fn emit(sink: &mut Box<dyn ChunkSink>, chunk: CodedChunk, meta: ChunkMeta, shared: &Shared) {
    shared.chunks_emitted.fetch_add(1, Ordering::Relaxed);
    shared
        .bytes_out
        .fetch_add(chunk.data.len() as u64, Ordering::Relaxed);
    if chunk.is_key {
        shared.keyframes.fetch_add(1, Ordering::Relaxed);
    }
    if let Err(err) = sink.on_chunk(chunk, meta) {
        shared.record_error(err);
    }
}
