//! Frame buffers and frame lifetime accounting.
//!
//! [`DecodedFrame`] and [`CompositedFrame`] each pass through exactly one
//! pipeline stage and are released on that stage's exit path; release is
//! RAII (`Drop`), and every frame carries a guard against the run's
//! [`FrameLedger`] so leaks are observable: after an export finishes —
//! successfully, with an error, or cancelled — the live counts must be
//! zero.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::color::ColorSpaceDesc;
use crate::types::Resolution;

/// An owned RGBA8 image.
///
/// This is the engine's image handle. In a GPU deployment the pixel store
/// is device-resident and this type wraps the device allocation; the
/// software stages in this workspace keep it in host memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    resolution: Resolution,
    rgba: Vec<u8>,
}

impl ImageBuffer {
    /// Allocate a zeroed (transparent black) image.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            rgba: vec![0u8; resolution.rgba_byte_size()],
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    /// Fill the whole image with one color.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.rgba.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.resolution.width && y < self.resolution.height);
        (y as usize * self.resolution.width as usize + x as usize) * 4
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let o = self.offset(x, y);
        [
            self.rgba[o],
            self.rgba[o + 1],
            self.rgba[o + 2],
            self.rgba[o + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.offset(x, y);
        self.rgba[o..o + 4].copy_from_slice(&rgba);
    }

    /// Source-over blend of `rgba` onto the pixel at `(x, y)`.
    pub fn blend_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let a = rgba[3] as u32;
        if a == 0 {
            return;
        }
        if a == 255 {
            self.put_pixel(x, y, rgba);
            return;
        }
        let dst = self.get_pixel(x, y);
        let inv = 255 - a;
        let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * inv + 127) / 255) as u8;
        let out_a = (a + dst[3] as u32 * inv / 255).min(255) as u8;
        self.put_pixel(
            x,
            y,
            [
                mix(rgba[0], dst[0]),
                mix(rgba[1], dst[1]),
                mix(rgba[2], dst[2]),
                out_a,
            ],
        );
    }

    /// FNV-1a hash of the pixel data. Stable across runs; used by the
    /// software encoder and by determinism tests.
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &b in &self.rgba {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

/// Media information returned by opening a source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration_us: u64,
}

impl SourceInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Which frame population a ledger entry belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Decoded,
    Composited,
}

/// Snapshot of ledger counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub decoded_live: i64,
    pub composited_live: i64,
    pub decoded_total: u64,
    pub composited_total: u64,
}

/// Per-run accounting of frame allocations and releases.
#[derive(Debug, Default)]
pub struct FrameLedger {
    decoded_live: AtomicI64,
    composited_live: AtomicI64,
    decoded_total: AtomicU64,
    composited_total: AtomicU64,
}

impl FrameLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new frame; the returned guard releases it on drop.
    pub fn track(self: &Arc<Self>, kind: FrameKind) -> LedgerGuard {
        match kind {
            FrameKind::Decoded => {
                self.decoded_live.fetch_add(1, Ordering::SeqCst);
                self.decoded_total.fetch_add(1, Ordering::Relaxed);
            }
            FrameKind::Composited => {
                self.composited_live.fetch_add(1, Ordering::SeqCst);
                self.composited_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        LedgerGuard {
            ledger: Arc::clone(self),
            kind,
        }
    }

    /// Total frames currently alive across both populations.
    pub fn live(&self) -> i64 {
        self.decoded_live.load(Ordering::SeqCst) + self.composited_live.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            decoded_live: self.decoded_live.load(Ordering::SeqCst),
            composited_live: self.composited_live.load(Ordering::SeqCst),
            decoded_total: self.decoded_total.load(Ordering::Relaxed),
            composited_total: self.composited_total.load(Ordering::Relaxed),
        }
    }
}

/// RAII registration of one frame in a [`FrameLedger`].
#[derive(Debug)]
pub struct LedgerGuard {
    ledger: Arc<FrameLedger>,
    kind: FrameKind,
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        let counter = match self.kind {
            FrameKind::Decoded => &self.ledger.decoded_live,
            FrameKind::Composited => &self.ledger.composited_live,
        };
        counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A decoded source frame bound to its source timestamp.
///
/// Holds exclusive ownership of its image until dropped.
#[derive(Debug)]
pub struct DecodedFrame {
    image: ImageBuffer,
    src_ts_us: u64,
    _guard: LedgerGuard,
}

impl DecodedFrame {
    pub fn new(image: ImageBuffer, src_ts_us: u64, ledger: &Arc<FrameLedger>) -> Self {
        Self {
            image,
            src_ts_us,
            _guard: ledger.track(FrameKind::Decoded),
        }
    }

    pub fn image(&self) -> &ImageBuffer {
        &self.image
    }

    pub fn src_ts_us(&self) -> u64 {
        self.src_ts_us
    }
}

/// An output frame bound to its effective timestamp, tagged with the
/// pipeline's fixed output color convention.
#[derive(Debug)]
pub struct CompositedFrame {
    image: ImageBuffer,
    eff_ts_us: u64,
    duration_us: u64,
    color: ColorSpaceDesc,
    _guard: LedgerGuard,
}

impl CompositedFrame {
    /// Snapshot the compositor's current target into an owned frame.
    ///
    /// The copy is the handle bridge across the encoder boundary: the
    /// compositor target is overwritten by the next `render`, so the
    /// submitted frame must own its pixels.
    pub fn from_target(
        target: &ImageBuffer,
        eff_ts_us: u64,
        duration_us: u64,
        ledger: &Arc<FrameLedger>,
    ) -> Self {
        Self {
            image: target.clone(),
            eff_ts_us,
            duration_us,
            color: ColorSpaceDesc::OUTPUT,
            _guard: ledger.track(FrameKind::Composited),
        }
    }

    pub fn image(&self) -> &ImageBuffer {
        &self.image
    }

    pub fn eff_ts_us(&self) -> u64 {
        self.eff_ts_us
    }

    pub fn duration_us(&self) -> u64 {
        self.duration_us
    }

    pub fn color(&self) -> ColorSpaceDesc {
        self.color
    }
}
