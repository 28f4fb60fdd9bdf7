//! `rf-pipeline` — Export orchestration for the ReFrame engine.
//!
//! Given an [`ExportSpec`] (source, trims, styling, output parameters),
//! the pipeline decodes the source, composites each output frame, encodes
//! it, and muxes the chunks into an MP4 blob — frame-accurately: the
//! output timeline is the source timeline with the trim set excised, and
//! the i-th chunk's timestamp is exactly `i · frame_period`.
//!
//! - [`timemap`] — the effective⇄source time bijection implementing trims
//! - [`spec`] — the validated declarative input
//! - [`decode`] — the bounded decode-ahead queue over the source reader
//! - [`progress`] — per-frame progress events and sinks
//! - [`pipeline`] — [`ExportPipeline`]: the coordinated run loop, with
//!   blocking (`run`) and threaded (`start` → [`ExportHandle`]) entry
//!   points
//! - [`error`] — [`ExportError`], the single error surface of a run

pub mod decode;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod spec;
pub mod timemap;

pub use decode::DECODE_AHEAD;
pub use error::{ExportError, ExportResult};
pub use pipeline::{CancelHandle, ExportHandle, ExportPipeline};
pub use progress::{ProgressEvent, ProgressSink};
pub use spec::ExportSpec;
pub use timemap::{InvalidTrim, TimeMap};
