//! Core numeric types with newtype pattern for type safety.
//!
//! All timestamps in the engine are integer microseconds (`u64`). The types
//! here cover the two remaining numeric concerns: exact frame rates and
//! pixel dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational frame rate (e.g., 30000/1001 for 29.97fps).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const FPS_24: Self = Self { num: 24, den: 1 };
    pub const FPS_25: Self = Self { num: 25, den: 1 };
    pub const FPS_30: Self = Self { num: 30, den: 1 };
    pub const FPS_29_97: Self = Self {
        num: 30000,
        den: 1001,
    };
    pub const FPS_60: Self = Self { num: 60, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        assert!(num > 0, "Rational numerator must be > 0");
        assert!(den > 0, "Rational denominator must be > 0");
        Self { num, den }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Duration of a single frame in integer microseconds (truncated).
    ///
    /// Presentation timestamps are multiples of this value, so truncation
    /// (not rounding) keeps `i * frame_period_us` from drifting past the
    /// exact frame boundary.
    pub fn frame_period_us(self) -> u64 {
        (1_000_000u64 * self.den as u64) / self.num as u64
    }

    /// Number of whole frames needed to cover `duration_us`, rounding up.
    ///
    /// Computed against the exact rational rate, not the truncated period,
    /// so a 3 s clip at 30 fps is exactly 90 frames.
    pub fn frames_covering_us(self, duration_us: u64) -> u64 {
        let ticks = duration_us as u128 * self.num as u128;
        let denom = self.den as u128 * 1_000_000u128;
        ticks.div_ceil(denom) as u64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Video/image resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Self = Self {
        width: 1920,
        height: 1080,
    };
    pub const HD_720: Self = Self {
        width: 1280,
        height: 720,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Whether both dimensions satisfy encoder alignment (even, nonzero).
    pub fn is_encoder_aligned(self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width.is_multiple_of(2)
            && self.height.is_multiple_of(2)
    }

    /// Byte size for RGBA8 pixel data.
    pub fn rgba_byte_size(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
