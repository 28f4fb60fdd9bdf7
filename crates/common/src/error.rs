//! Component error types (thiserror-based).
//!
//! The enums here belong to the collaborator contracts in
//! [`crate::traits`]; the top-level export error that aggregates them lives
//! in the pipeline crate.

use thiserror::Error;

use crate::config::CodecId;

/// Source reader errors.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    /// Retriable: the pipeline retries a failed seek once per frame with a
    /// fresh seek before treating it as fatal.
    #[error("Seek to {target_us} µs failed: {reason}")]
    SeekFailed { target_us: u64, reason: String },

    #[error("Decode failed at {src_ts_us} µs: {reason}")]
    DecodeFailed { src_ts_us: u64, reason: String },
}

/// Compositor errors.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Compositor init failed: {0}")]
    Init(String),

    #[error("Render failed at {src_ts_us} µs: {reason}")]
    RenderFailed { src_ts_us: u64, reason: String },
}

/// Encoder errors. Every encoder error is fatal to the export.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("No backend supports codec {0}")]
    CodecUnsupported(CodecId),

    #[error("Encoder failed: {0}")]
    EncoderFailed(String),

    #[error("Encoder is {state}, operation requires {required}")]
    InvalidState {
        state: &'static str,
        required: &'static str,
    },

    #[error("Chunk sink rejected encoder output: {0}")]
    SinkClosed(String),
}

/// Muxer errors.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Muxer init failed: {0}")]
    MuxerInit(String),

    #[error("First chunk carried no codec description")]
    MissingCodecDescription,

    #[error("Mux failed: {0}")]
    MuxFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
