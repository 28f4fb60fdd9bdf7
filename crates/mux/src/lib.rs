//! `rf-mux` — MP4 container muxer for the ReFrame engine.
//!
//! Writes encoded video chunks into an ISO Base Media (MP4) byte blob:
//!
//! - **No FFmpeg dependency** — pure Rust box writing
//! - **Progressive mdat** — chunk data is appended as it arrives
//! - **Moov-at-end** — metadata is written during `finalize()`
//! - **In-memory output** — `finalize()` returns the container bytes; the
//!   caller decides where they go
//!
//! The track timescale is one tick per microsecond, so chunk timestamps
//! and durations are carried into the container exactly. The sample entry
//! embeds the codec description blob (`avcC`) captured from the encoder's
//! first chunk, plus an `nclx` colour box for the pipeline's fixed output
//! color convention.

pub mod atoms;
pub mod mp4;
pub mod muxer;

pub use muxer::Mp4Muxer;
