//! Synthetic source — deterministic generated clips.
//!
//! `SyntheticSource` models a seekable decoder over a generated clip: it
//! keeps a decoder clock, honors the idempotent-seek optimization, clamps
//! past-end requests to the last available frame, and stamps every decoded
//! frame with a presentation time within tolerance of the request. Pixels
//! are a pure function of (pattern, native frame index, resolution), so a
//! given request always yields the same image.

use std::sync::Arc;

use tracing::{debug, trace};

use rf_common::{
    DecodedFrame, FrameLedger, ImageBuffer, Rational, Resolution, SourceError, SourceInfo,
    SourceReader,
};

/// Seek requests within this distance of the decoder clock skip the seek.
pub const SEEK_TOLERANCE_US: u64 = 1_000;

/// Test-pattern family for generated clips.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Vertical color bars with a moving cursor column.
    Smpte,
    /// Two-axis gradient with a per-frame hue shift.
    Gradient,
    /// Checkerboard with a per-frame phase shift.
    Checker,
}

impl Pattern {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "smpte" => Some(Self::Smpte),
            "gradient" => Some(Self::Gradient),
            "checker" => Some(Self::Checker),
            _ => None,
        }
    }
}

/// Seek/capture statistics, used to observe the idempotent-seek path.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SeekStats {
    pub performed: u64,
    pub skipped: u64,
}

/// A deterministic software source reader.
#[derive(Debug)]
pub struct SyntheticSource {
    pattern: Pattern,
    info: SourceInfo,
    native_fps: Rational,
    ledger: Arc<FrameLedger>,
    /// Decoder clock; `None` before the first seek.
    position_us: Option<u64>,
    closed: bool,
    stats: SeekStats,
}

impl SyntheticSource {
    pub fn new(
        pattern: Pattern,
        resolution: Resolution,
        duration_us: u64,
        native_fps: Rational,
        ledger: Arc<FrameLedger>,
    ) -> Result<Self, SourceError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(SourceError::UnsupportedFormat(format!(
                "zero-sized source {resolution}"
            )));
        }
        if duration_us == 0 {
            return Err(SourceError::UnsupportedFormat(
                "source has zero duration".to_string(),
            ));
        }
        debug!(
            ?pattern,
            %resolution,
            duration_us,
            fps = %native_fps,
            "Opened synthetic source"
        );
        Ok(Self {
            pattern,
            info: SourceInfo {
                width: resolution.width,
                height: resolution.height,
                duration_us,
            },
            native_fps,
            ledger,
            position_us: None,
            closed: false,
            stats: SeekStats::default(),
        })
    }

    pub fn seek_stats(&self) -> SeekStats {
        self.stats
    }

    /// Native frame index the decoder clock currently sits on.
    fn native_index(&self, ts_us: u64) -> u64 {
        (ts_us as u128 * self.native_fps.num as u128
            / (self.native_fps.den as u128 * 1_000_000u128)) as u64
    }

    fn render_native_frame(&self, index: u64) -> ImageBuffer {
        let res = self.info.resolution();
        let mut img = ImageBuffer::new(res);
        match self.pattern {
            Pattern::Smpte => {
                const BARS: [[u8; 4]; 7] = [
                    [192, 192, 192, 255],
                    [192, 192, 0, 255],
                    [0, 192, 192, 255],
                    [0, 192, 0, 255],
                    [192, 0, 192, 255],
                    [192, 0, 0, 255],
                    [0, 0, 192, 255],
                ];
                let cursor = (index % res.width as u64) as u32;
                for y in 0..res.height {
                    for x in 0..res.width {
                        let bar = (x as u64 * 7 / res.width as u64) as usize;
                        let px = if x == cursor {
                            [255, 255, 255, 255]
                        } else {
                            BARS[bar]
                        };
                        img.put_pixel(x, y, px);
                    }
                }
            }
            Pattern::Gradient => {
                let shift = ((index * 7) % 256) as u32;
                for y in 0..res.height {
                    for x in 0..res.width {
                        let r = (x * 255 / res.width.max(1)) as u8;
                        let g = (y * 255 / res.height.max(1)) as u8;
                        let b = ((x + y + shift) % 256) as u8;
                        img.put_pixel(x, y, [r, g, b, 255]);
                    }
                }
            }
            Pattern::Checker => {
                const CELL: u32 = 32;
                let phase = (index % 2) as u32;
                for y in 0..res.height {
                    for x in 0..res.width {
                        let on = ((x / CELL) + (y / CELL) + phase) % 2 == 0;
                        let px = if on {
                            [235, 235, 235, 255]
                        } else {
                            [20, 20, 20, 255]
                        };
                        img.put_pixel(x, y, px);
                    }
                }
            }
        }
        img
    }
}

impl SourceReader for SyntheticSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn frame_at(&mut self, src_ts_us: u64) -> Result<DecodedFrame, SourceError> {
        if self.closed {
            return Err(SourceError::DecodeFailed {
                src_ts_us,
                reason: "reader is closed".to_string(),
            });
        }

        // Requests at or past the end of the clip land on the last frame.
        let target_us = src_ts_us.min(self.info.duration_us - 1);

        match self.position_us {
            Some(pos) if pos.abs_diff(target_us) <= SEEK_TOLERANCE_US => {
                self.stats.skipped += 1;
                trace!(pos, target_us, "Seek skipped (within tolerance)");
            }
            _ => {
                self.position_us = Some(target_us);
                self.stats.performed += 1;
                trace!(target_us, "Seek performed");
            }
        }

        let position = self.position_us.expect("position set by seek");
        let index = self.native_index(position);
        let image = self.render_native_frame(index);
        Ok(DecodedFrame::new(image, position, &self.ledger))
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(
                performed = self.stats.performed,
                skipped = self.stats.skipped,
                "Closed synthetic source"
            );
            self.closed = true;
        }
    }
}
