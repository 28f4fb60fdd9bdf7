//! Configuration structs for the encoder and the compositor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::layers::EditLayers;
use crate::types::{Rational, Resolution};

/// Opaque codec identifier, e.g. `"avc1.640033"`.
///
/// The pipeline never interprets the string beyond family detection; the
/// encoder backend parses profile/level out of it where the family calls
/// for that.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecId(pub String);

impl CodecId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier names an AVC-family codec (`avc1`/`avc3`).
    pub fn is_avc_family(&self) -> bool {
        self.0 == "avc1"
            || self.0 == "avc3"
            || self.0.starts_with("avc1.")
            || self.0.starts_with("avc3.")
    }
}

impl Default for CodecId {
    fn default() -> Self {
        Self("avc1.640033".to_string())
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acceleration preference tried by the encoder when selecting a backend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acceleration {
    #[default]
    PreferHardware,
    PreferSoftware,
}

impl Acceleration {
    pub fn label(self) -> &'static str {
        match self {
            Self::PreferHardware => "prefer-hardware",
            Self::PreferSoftware => "prefer-software",
        }
    }
}

/// Encoder configuration derived from the export spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub codec: CodecId,
    pub resolution: Resolution,
    pub fps: Rational,
    /// Target bitrate in bits per second; bitrate mode is variable.
    pub bitrate_bps: u64,
}

/// Compositor configuration derived from the export spec and probed source.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Output frame dimensions.
    pub output: Resolution,
    /// Source clip dimensions.
    pub source: Resolution,
    /// Editorial layers, passed through verbatim from the export spec.
    pub layers: EditLayers,
}
