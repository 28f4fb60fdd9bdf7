//! `rf-common` — Shared types, traits, and errors for the ReFrame engine.
//!
//! This crate is the foundation that all other engine crates depend on.
//! It defines the core abstractions:
//!
//! - **Types**: `Rational`, `Resolution` (newtypes for safety); timestamps
//!   are integer microseconds throughout
//! - **Trims**: `TimeInterval`, `TrimSet` (spans of source time removed
//!   from the output)
//! - **Frames**: `ImageBuffer`, `DecodedFrame`, `CompositedFrame`,
//!   `FrameLedger` (frame data flow and lifetime accounting)
//! - **Chunks**: `CodedChunk`, `CodecDescription`, `ChunkMeta` (encoder
//!   output on its way into the container)
//! - **Traits**: `SourceReader`, `FrameCompositor`, `ContainerMuxer`
//!   (collaborator contracts the pipeline drives)
//! - **Errors**: `SourceError`, `RenderError`, `EncodeError`, `MuxError`
//!   (thiserror-based, one enum per concern)
//! - **Config**: `CodecId`, `Acceleration`, `EncoderConfig`, `RenderConfig`
//! - **Layers**: `EditLayers` (editorial payload, interpreted only by the
//!   compositor)

pub mod chunk;
pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod layers;
pub mod traits;
pub mod trim;
pub mod types;

// Re-export commonly used items at crate root
pub use chunk::{Blob, ChunkMeta, CodecDescription, CodedChunk};
pub use color::{ColorPrimaries, ColorSpaceDesc, MatrixCoefficients, TransferCharacteristics};
pub use config::{Acceleration, CodecId, EncoderConfig, RenderConfig};
pub use error::{EncodeError, MuxError, RenderError, SourceError};
pub use frame::{
    CompositedFrame, DecodedFrame, FrameKind, FrameLedger, ImageBuffer, LedgerStats, SourceInfo,
};
pub use layers::{Annotation, CropRegion, EditLayers, Shadow, Wallpaper, ZoomRegion};
pub use traits::{ContainerMuxer, FrameCompositor, SourceReader};
pub use trim::{TimeInterval, TrimSet};
pub use types::{Rational, Resolution};
