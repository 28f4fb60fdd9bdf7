//! Decode-ahead queue.
//!
//! A single `decode-worker` thread owns the source reader, which keeps
//! seeks strictly serialized no matter how many requests are outstanding.
//! Requests and results travel over bounded FIFOs of depth
//! [`DECODE_AHEAD`]; the pipeline prefills the request queue and tops it
//! up one request per consumed frame, so decoded frames held ahead of the
//! render loop stay bounded.
//!
//! Failed seeks are retried once with a fresh seek; any other reader
//! error stops the worker, and the pipeline surfaces it when the queue
//! starves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use rf_common::{DecodedFrame, SourceError, SourceReader};

use crate::error::ExportError;

/// Depth of the decode-ahead queue.
pub const DECODE_AHEAD: usize = 10;

/// How long `next` waits between checks of the cancel flag.
const RECV_POLL: Duration = Duration::from_millis(20);

/// A scheduled decode.
#[derive(Copy, Clone, Debug)]
pub(crate) struct DecodeRequest {
    pub frame_index: u64,
    pub eff_ts_us: u64,
    pub src_ts_us: u64,
}

/// A decoded frame paired with the timestamps that addressed it.
#[derive(Debug)]
pub(crate) struct DecodedSlot {
    pub frame: DecodedFrame,
    pub eff_ts_us: u64,
    pub src_ts_us: u64,
}

pub(crate) struct DecodeQueue {
    request_tx: Option<Sender<DecodeRequest>>,
    result_rx: Receiver<Result<DecodedSlot, SourceError>>,
    worker: Option<JoinHandle<()>>,
}

impl DecodeQueue {
    /// Take ownership of the reader and start the worker.
    pub fn spawn(reader: Box<dyn SourceReader>) -> Result<Self, ExportError> {
        let (request_tx, request_rx) = channel::bounded::<DecodeRequest>(DECODE_AHEAD);
        let (result_tx, result_rx) = channel::bounded::<Result<DecodedSlot, SourceError>>(DECODE_AHEAD);

        let worker = thread::Builder::new()
            .name("decode-worker".to_string())
            .spawn(move || run_worker(reader, request_rx, result_tx))
            .map_err(|e| ExportError::Worker(format!("failed to spawn decode worker: {e}")))?;

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            worker: Some(worker),
        })
    }

    /// Fire-and-forget scheduling. The pipeline's discipline (at most
    /// [`DECODE_AHEAD`] outstanding requests) keeps this from blocking; a
    /// dead worker is detected on the next `next` call instead.
    pub fn request(&self, request: DecodeRequest) {
        if let Some(tx) = &self.request_tx {
            if tx.try_send(request).is_err() {
                warn!(
                    frame = request.frame_index,
                    "Decode request dropped (queue unavailable)"
                );
            }
        }
    }

    /// Await the queue head. Returns `Ok(None)` when `cancel` was raised
    /// while waiting; starvation (worker gone with no pending result) is
    /// fatal.
    pub fn next(&self, cancel: &AtomicBool) -> Result<Option<DecodedSlot>, ExportError> {
        loop {
            match self.result_rx.recv_timeout(RECV_POLL) {
                Ok(Ok(slot)) => return Ok(Some(slot)),
                Ok(Err(err)) => return Err(err.into()),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::DecodeFailed {
                        src_ts_us: 0,
                        reason: "decode queue starved: worker terminated".to_string(),
                    }
                    .into())
                }
            }
        }
    }

    /// Stop the worker and close the reader. Idempotent.
    pub fn shutdown(&mut self) {
        self.request_tx = None;
        let Some(worker) = self.worker.take() else {
            return;
        };
        // The worker may be parked on a full results queue (the pipeline
        // stopped consuming mid-run); keep draining so it can finish its
        // remaining requests and exit. Dropped results release their
        // frames.
        while !worker.is_finished() {
            while self.result_rx.try_recv().is_ok() {}
            thread::sleep(Duration::from_millis(1));
        }
        let _ = worker.join();
    }
}

impl Drop for DecodeQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut reader: Box<dyn SourceReader>,
    request_rx: Receiver<DecodeRequest>,
    result_tx: Sender<Result<DecodedSlot, SourceError>>,
) {
    for request in request_rx {
        let result = match reader.frame_at(request.src_ts_us) {
            Err(SourceError::SeekFailed { target_us, reason }) => {
                warn!(target_us, %reason, "Seek failed, retrying once");
                reader.frame_at(request.src_ts_us)
            }
            other => other,
        };

        match result {
            Ok(frame) => {
                let slot = DecodedSlot {
                    frame,
                    eff_ts_us: request.eff_ts_us,
                    src_ts_us: request.src_ts_us,
                };
                // Receiver gone: the pipeline is tearing down.
                if result_tx.send(Ok(slot)).is_err() {
                    break;
                }
            }
            Err(err) => {
                error!(frame = request.frame_index, %err, "Decode failed");
                let _ = result_tx.send(Err(err));
                break;
            }
        }
    }
    reader.close();
    debug!("Decode worker stopped");
}
