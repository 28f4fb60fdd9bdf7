//! `rf-encoder` — Video encoding for the ReFrame engine.
//!
//! The encoder is split along the same seam as hardware video APIs:
//!
//! - [`backend`] — the `CodecBackend` trait and acceleration-preference
//!   selection (`prefer-hardware` first, `prefer-software` fallback)
//! - [`software`] — the built-in deterministic software AVC backend
//! - [`session`] — [`session::VideoEncoder`], the stateful front-end the
//!   pipeline drives: submission-order chunk delivery, fixed 150-frame
//!   GOP, codec-description capture, and the `in_flight` backpressure
//!   counter (`MAX_IN_FLIGHT` = 120)
//!
//! # Encode path
//!
//! ```text
//! CompositedFrame
//!   --> VideoEncoder::submit (blocks while in_flight >= MAX_IN_FLIGHT)
//!     --> encode-worker thread
//!       --> CodecBackend::encode -> CodedChunk
//!         --> description capture / re-attachment
//!           --> ChunkSink::on_chunk (FIFO, submission order)
//! ```

pub mod backend;
pub mod session;
pub mod software;

pub use backend::{select_backend, CodecBackend, CodecBackendFactory, DefaultBackendFactory};
pub use session::{
    ChannelSink, ChunkSink, EncoderStats, Submit, VideoEncoder, GOP_LENGTH, MAX_IN_FLIGHT,
};
pub use software::SoftwareAvcBackend;
