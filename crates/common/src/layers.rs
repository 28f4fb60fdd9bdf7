//! Edit layer description — interface between the export spec and the
//! compositor.
//!
//! The pipeline passes an [`EditLayers`] value through to the compositor
//! verbatim and never interprets it. Time-keyed layers (zooms, annotations)
//! are keyed by **source** time, which is why the compositor receives the
//! source timestamp alongside each decoded frame.

use serde::{Deserialize, Serialize};

/// Solid wallpaper fill behind the video content.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallpaper {
    pub rgba: [u8; 4],
}

/// Crop region in normalized source coordinates (`0.0..=1.0`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    /// Full-frame crop (the identity).
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Clamp the region into the unit square with a nonzero extent.
    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 1.0 - f32::EPSILON);
        let y = self.y.clamp(0.0, 1.0 - f32::EPSILON);
        let width = self.width.clamp(f32::EPSILON, 1.0 - x);
        let height = self.height.clamp(f32::EPSILON, 1.0 - y);
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A zoom applied while the source timestamp lies inside
/// `[start_us, end_us)`. `scale` > 1 magnifies around `center`
/// (normalized source coordinates).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoomRegion {
    pub start_us: u64,
    pub end_us: u64,
    pub center: [f32; 2],
    pub scale: f32,
}

impl ZoomRegion {
    pub fn contains(&self, src_ts_us: u64) -> bool {
        src_ts_us >= self.start_us && src_ts_us < self.end_us
    }
}

/// Drop shadow behind the video content rectangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shadow {
    pub rgba: [u8; 4],
    pub spread_px: u32,
}

/// A translucent annotation box, active while the source timestamp lies in
/// `[start_us, end_us)`. `rect` is `[x, y, w, h]` in normalized output
/// coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub start_us: u64,
    pub end_us: u64,
    pub rect: [f32; 4],
    pub rgba: [u8; 4],
}

impl Annotation {
    pub fn contains(&self, src_ts_us: u64) -> bool {
        src_ts_us >= self.start_us && src_ts_us < self.end_us
    }
}

/// The full editorial payload of an export spec.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EditLayers {
    pub wallpaper: Option<Wallpaper>,
    pub crop: Option<CropRegion>,
    pub zooms: Vec<ZoomRegion>,
    pub shadow: Option<Shadow>,
    pub annotations: Vec<Annotation>,
}

impl EditLayers {
    pub fn is_empty(&self) -> bool {
        self.wallpaper.is_none()
            && self.crop.is_none()
            && self.zooms.is_empty()
            && self.shadow.is_none()
            && self.annotations.is_empty()
    }
}
