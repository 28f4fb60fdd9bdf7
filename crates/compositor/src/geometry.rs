//! Compositing geometry — content placement and source sampling windows.

use rf_common::{CropRegion, Resolution, ZoomRegion};

/// Zoom regions ease in and out over this many microseconds at each edge.
pub const ZOOM_RAMP_US: u64 = 250_000;

/// An axis-aligned rectangle in output pixel space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl PixelRect {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

/// The source region (in source pixel coordinates) a frame is sampled from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleWindow {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Place the (cropped) source inside the output, centered and
/// aspect-preserving (letterbox/pillarbox against the wallpaper).
pub fn content_rect(crop: Option<CropRegion>, source: Resolution, output: Resolution) -> PixelRect {
    let crop = crop.map(CropRegion::clamped).unwrap_or(CropRegion::FULL);
    let src_w = crop.width * source.width as f32;
    let src_h = crop.height * source.height as f32;

    let out_w = output.width as f32;
    let out_h = output.height as f32;
    let scale = (out_w / src_w).min(out_h / src_h);

    let w = (src_w * scale).round() as i64;
    let h = (src_h * scale).round() as i64;
    PixelRect {
        x: (output.width as i64 - w) / 2,
        y: (output.height as i64 - h) / 2,
        w: w.max(1),
        h: h.max(1),
    }
}

/// Compute the sampling window for a frame at `src_ts_us`: the clamped
/// crop region, shrunk around the active zoom's center.
///
/// The first zoom region containing the timestamp wins. Its magnification
/// ramps linearly from 1 at each region edge over [`ZOOM_RAMP_US`], so
/// zooms ease in and out instead of popping.
pub fn sample_window(
    source: Resolution,
    crop: Option<CropRegion>,
    zooms: &[ZoomRegion],
    src_ts_us: u64,
) -> SampleWindow {
    let crop = crop.map(CropRegion::clamped).unwrap_or(CropRegion::FULL);
    let src_w = source.width as f32;
    let src_h = source.height as f32;

    let mut win = SampleWindow {
        x: crop.x * src_w,
        y: crop.y * src_h,
        w: crop.width * src_w,
        h: crop.height * src_h,
    };

    if let Some(zoom) = zooms.iter().find(|z| z.contains(src_ts_us)) {
        let scale = effective_scale(zoom, src_ts_us);
        if scale > 1.0 {
            let w = win.w / scale;
            let h = win.h / scale;
            let cx = zoom.center[0] * src_w;
            let cy = zoom.center[1] * src_h;
            win = SampleWindow {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                w,
                h,
            };
        }
    }

    clamp_window(win, src_w, src_h)
}

/// Magnification at `src_ts_us`, eased at the region edges.
fn effective_scale(zoom: &ZoomRegion, src_ts_us: u64) -> f32 {
    let ramp = ZOOM_RAMP_US.min((zoom.end_us - zoom.start_us) / 2).max(1);
    let from_start = src_ts_us.saturating_sub(zoom.start_us);
    let to_end = zoom.end_us.saturating_sub(src_ts_us);
    let ease = (from_start.min(to_end) as f32 / ramp as f32).clamp(0.0, 1.0);
    1.0 + (zoom.scale.max(1.0) - 1.0) * ease
}

/// Shift the window back inside the source bounds, shrinking if oversized.
fn clamp_window(mut win: SampleWindow, src_w: f32, src_h: f32) -> SampleWindow {
    win.w = win.w.clamp(1.0, src_w);
    win.h = win.h.clamp(1.0, src_h);
    win.x = win.x.clamp(0.0, src_w - win.w);
    win.y = win.y.clamp(0.0, src_h - win.h);
    win
}
