//! Export specification — the immutable declarative input of a run.

use serde::{Deserialize, Serialize};

use rf_common::{CodecId, EditLayers, EncoderConfig, Rational, RenderConfig, Resolution, TrimSet};

use crate::error::ExportError;

/// Everything that defines one export. Validated once; immutable for the
/// duration of the run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportSpec {
    /// Output width in pixels (even).
    pub width: u32,
    /// Output height in pixels (even).
    pub height: u32,
    /// Output frame rate.
    pub frame_rate: Rational,
    /// Target bitrate in bits per second (variable bitrate mode).
    pub bitrate_bps: u64,
    /// Opaque codec identifier handed to the encoder.
    pub codec: CodecId,
    /// Resource identifier handed to the source reader.
    pub source_uri: String,
    /// Spans of source time removed from the output.
    pub trims: TrimSet,
    /// Editorial payload, passed verbatim to the compositor.
    pub layers: EditLayers,
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: Rational::FPS_30,
            bitrate_bps: 12_000_000,
            codec: CodecId::default(),
            source_uri: String::new(),
            trims: TrimSet::default(),
            layers: EditLayers::default(),
        }
    }
}

impl ExportSpec {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn frame_period_us(&self) -> u64 {
        self.frame_rate.frame_period_us()
    }

    /// Structural validation. Trim-versus-duration checks need the probed
    /// source and happen when the time map is built.
    pub fn validate(&self) -> Result<(), ExportError> {
        if !self.resolution().is_encoder_aligned() {
            return Err(ExportError::InvalidSpec(format!(
                "output resolution {} must be even and nonzero",
                self.resolution()
            )));
        }
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(ExportError::InvalidSpec(
                "frame rate must be a positive rational".to_string(),
            ));
        }
        if self.bitrate_bps == 0 {
            return Err(ExportError::InvalidSpec("bitrate must be > 0".to_string()));
        }
        if self.source_uri.is_empty() {
            return Err(ExportError::InvalidSpec(
                "source uri must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self.trims.first_invalid() {
            return Err(ExportError::InvalidSpec(format!(
                "trim [{}, {}) is empty or inverted",
                bad.start_us, bad.end_us
            )));
        }
        Ok(())
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            codec: self.codec.clone(),
            resolution: self.resolution(),
            fps: self.frame_rate,
            bitrate_bps: self.bitrate_bps,
        }
    }

    pub fn render_config(&self, source: Resolution) -> RenderConfig {
        RenderConfig {
            output: self.resolution(),
            source,
            layers: self.layers.clone(),
        }
    }
}
