//! Collaborator contracts consumed by the export pipeline.
//!
//! The pipeline programs against these traits, not against concrete
//! implementations: the crates in this workspace provide software
//! implementations, and a GPU/hardware deployment swaps its own in without
//! touching the orchestration.

use crate::chunk::{Blob, ChunkMeta, CodedChunk};
use crate::config::RenderConfig;
use crate::error::{MuxError, RenderError, SourceError};
use crate::frame::{DecodedFrame, ImageBuffer, SourceInfo};

/// Produces decoded frames addressed by source time.
///
/// # Contract
///
/// - `frame_at` delivers a frame whose presentation time is within 1 ms of
///   the requested source time; requests at or past the end of the clip
///   are clamped to the last available frame, never failed.
/// - Implementations may skip the seek when the decoder already sits
///   within tolerance of the target (idempotent-seek optimization), but a
///   seek that does happen must complete before capture.
/// - Readers are single-producer: the caller issues at most one
///   outstanding `frame_at` at a time. The pipeline enforces this by
///   owning each reader on a single decode worker.
/// - [`SourceError::SeekFailed`] is retriable (once per frame, with a
///   fresh seek); every other error is fatal.
pub trait SourceReader: Send + std::fmt::Debug {
    /// Media info probed at open time.
    fn info(&self) -> SourceInfo;

    /// Seek to `src_ts_us` and capture the frame there.
    fn frame_at(&mut self, src_ts_us: u64) -> Result<DecodedFrame, SourceError>;

    /// Release decoder resources. Idempotent.
    fn close(&mut self);
}

/// Renders one output frame from a decoded frame and the source timestamp
/// identifying it (time-keyed layers sample by source time).
///
/// # Contract
///
/// - The compositor owns exactly one target; `render` overwrites it and
///   `target` borrows it until the next `render` or `destroy`.
/// - Rendering is deterministic: identical inputs and layers produce a
///   pixel-identical target. No temporal carry-over between calls.
/// - Decoded frame ownership is not transferred; the caller releases the
///   frame after `render` returns.
pub trait FrameCompositor: Send {
    fn init(&mut self, config: &RenderConfig) -> Result<(), RenderError>;

    fn render(&mut self, frame: &DecodedFrame, src_ts_us: u64) -> Result<(), RenderError>;

    /// Borrow the current target.
    fn target(&self) -> Result<&ImageBuffer, RenderError>;

    /// Release the target and caches. Idempotent.
    fn destroy(&mut self);
}

/// Writes coded chunks into a container and finalizes them into a blob.
///
/// # Contract
///
/// - The first `add_chunk` call must carry a full codec description in its
///   metadata or fail with [`MuxError::MissingCodecDescription`].
/// - Chunks arrive in strictly increasing `pts_us`; the muxer may reject
///   violations with [`MuxError::MuxFailed`].
/// - The muxer is single-threaded relative to itself; the pipeline
///   serializes calls through a FIFO queue.
pub trait ContainerMuxer: Send {
    fn add_chunk(&mut self, chunk: &CodedChunk, meta: &ChunkMeta) -> Result<(), MuxError>;

    /// Write the trailer and return the container bytes. Legal only after
    /// every `add_chunk` has been applied.
    fn finalize(self: Box<Self>) -> Result<Blob, MuxError>;
}
