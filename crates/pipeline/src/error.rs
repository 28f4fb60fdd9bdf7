//! Top-level export error — aggregates the component error enums.

use thiserror::Error;

use rf_common::{EncodeError, MuxError, RenderError, SourceError};

/// Everything an export run can fail with.
///
/// Component errors convert in via `#[from]`; the remaining variants are
/// pipeline-level conditions. A run yields either `Ok(blob)` or exactly
/// one of these — partial blobs are never returned.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid export spec: {0}")]
    InvalidSpec(String),

    #[error("Export would produce no frames")]
    EmptyOutput,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error("Export worker failed: {0}")]
    Worker(String),

    #[error("Export cancelled")]
    Cancelled,
}

pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_convert() {
        let err: ExportError = SourceError::SourceUnavailable("nope".into()).into();
        assert!(matches!(err, ExportError::Source(_)));

        let err: ExportError = MuxError::MissingCodecDescription.into();
        assert!(matches!(err, ExportError::Mux(_)));
    }

    #[test]
    fn transparent_display_preserves_message() {
        let err: ExportError = SourceError::UnsupportedFormat("weird codec".into()).into();
        assert!(err.to_string().contains("weird codec"));
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(ExportError::Cancelled.to_string(), "Export cancelled");
    }
}
