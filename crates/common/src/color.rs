//! Color space signalling for composited output.
//!
//! The engine composites in 8-bit RGBA and tags every output frame with a
//! fixed convention: BT.709 primaries, sRGB transfer (IEC 61966-2-1),
//! identity (RGB) matrix, full range. The codes returned by the enums are
//! the ISO 23001-8 values the container signals in an `nclx` colour box.

use serde::{Deserialize, Serialize};

/// Color primaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorPrimaries {
    /// BT.709 (HD video standard).
    Bt709,
    /// BT.2020 (UHD / HDR content).
    Bt2020,
}

impl ColorPrimaries {
    pub fn nclx_code(self) -> u16 {
        match self {
            Self::Bt709 => 1,
            Self::Bt2020 => 9,
        }
    }
}

/// Transfer characteristics (gamma curve).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferCharacteristics {
    /// sRGB / IEC 61966-2-1.
    Srgb,
    /// BT.709 transfer.
    Bt709,
    /// Linear (1.0).
    Linear,
}

impl TransferCharacteristics {
    pub fn nclx_code(self) -> u16 {
        match self {
            Self::Srgb => 13,
            Self::Bt709 => 1,
            Self::Linear => 8,
        }
    }
}

/// Matrix coefficients for RGB<->YUV conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixCoefficients {
    /// Identity — samples are carried as RGB.
    Rgb,
    /// BT.709 YCbCr.
    Bt709,
}

impl MatrixCoefficients {
    pub fn nclx_code(self) -> u16 {
        match self {
            Self::Rgb => 0,
            Self::Bt709 => 1,
        }
    }
}

/// Full color-space description attached to composited frames and carried
/// into the container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorSpaceDesc {
    pub primaries: ColorPrimaries,
    pub transfer: TransferCharacteristics,
    pub matrix: MatrixCoefficients,
    pub full_range: bool,
}

impl ColorSpaceDesc {
    /// The pipeline's fixed output convention.
    pub const OUTPUT: Self = Self {
        primaries: ColorPrimaries::Bt709,
        transfer: TransferCharacteristics::Srgb,
        matrix: MatrixCoefficients::Rgb,
        full_range: true,
    };
}
