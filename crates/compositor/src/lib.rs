//! `rf-compositor` — Software frame compositor for the ReFrame engine.
//!
//! Renders one output frame per call from a decoded source frame plus the
//! edit layers (wallpaper, crop, time-keyed zoom, shadow, annotations).
//! The compositor owns exactly one render target which each `render`
//! overwrites; rendering is deterministic and carries no state between
//! frames beyond the target itself.
//!
//! A GPU deployment replaces [`SoftwareCompositor`] behind the
//! `FrameCompositor` trait; the geometry module is backend-neutral.

pub mod compositor;
pub mod geometry;

pub use compositor::SoftwareCompositor;
pub use geometry::{content_rect, sample_window, PixelRect, SampleWindow, ZOOM_RAMP_US};
