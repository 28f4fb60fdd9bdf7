//! `rf-source` — Source readers for the ReFrame engine.
//!
//! A source reader turns a URI into a stream of decoded frames addressed
//! by source time (see the `SourceReader` contract in `rf-common`). This
//! crate ships the software implementation:
//!
//! - [`synthetic`] — deterministic generated clips (`synth:` URIs), used
//!   by the test suite and as the reference reader implementation
//! - [`open_source`] — URI probing and reader construction
//!
//! A hardware deployment adds demuxer/NVDEC-backed readers behind the same
//! trait; the pipeline cannot tell the difference.

pub mod open;
pub mod synthetic;

pub use open::open_source;
pub use synthetic::{Pattern, SyntheticSource, SEEK_TOLERANCE_US};
