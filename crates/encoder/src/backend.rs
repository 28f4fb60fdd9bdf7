//! Codec backend abstraction and acceleration-preference selection.

use tracing::{info, warn};

use rf_common::{
    Acceleration, ChunkMeta, CodedChunk, CompositedFrame, EncodeError, EncoderConfig,
};

/// A codec implementation the encoder session drives.
///
/// Backends are synchronous from the worker's point of view; latency and
/// queueing live in the session. A backend attaches the stream's codec
/// description to the first chunk's metadata and may omit it afterwards —
/// the session re-attaches it.
pub trait CodecBackend: Send + std::fmt::Debug {
    /// Encode one frame. `keyframe` forces an IDR/sync sample.
    fn encode(
        &mut self,
        frame: &CompositedFrame,
        keyframe: bool,
    ) -> Result<(CodedChunk, ChunkMeta), EncodeError>;

    /// Drain frames still buffered inside the codec.
    fn flush(&mut self) -> Result<Vec<(CodedChunk, ChunkMeta)>, EncodeError>;
}

/// Creates codec backends per acceleration preference.
pub trait CodecBackendFactory: Send + Sync {
    /// Whether a backend exists for this config under this preference.
    fn supports(&self, config: &EncoderConfig, accel: Acceleration) -> bool;

    fn create(
        &self,
        config: &EncoderConfig,
        accel: Acceleration,
    ) -> Result<Box<dyn CodecBackend>, EncodeError>;
}

/// Try `prefer-hardware`, then `prefer-software`; fail with
/// [`EncodeError::CodecUnsupported`] when neither preference yields a
/// backend.
pub fn select_backend(
    factory: &dyn CodecBackendFactory,
    config: &EncoderConfig,
) -> Result<(Box<dyn CodecBackend>, Acceleration), EncodeError> {
    for accel in [Acceleration::PreferHardware, Acceleration::PreferSoftware] {
        if factory.supports(config, accel) {
            let backend = factory.create(config, accel)?;
            info!(
                codec = %config.codec,
                acceleration = accel.label(),
                "Codec backend selected"
            );
            return Ok((backend, accel));
        }
        warn!(
            codec = %config.codec,
            acceleration = accel.label(),
            "Codec backend unavailable, trying next preference"
        );
    }
    Err(EncodeError::CodecUnsupported(config.codec.clone()))
}

/// The workspace's built-in factory.
///
/// Hardware acceleration needs a GPU encode bridge (NVENC, VideoToolkit,
/// …) that this workspace does not link; the hardware probe therefore
/// always reports unsupported and exports fall back to the software AVC
/// backend. A deployment with real hardware swaps in its own factory.
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl CodecBackendFactory for DefaultBackendFactory {
    fn supports(&self, config: &EncoderConfig, accel: Acceleration) -> bool {
        match accel {
            Acceleration::PreferHardware => false,
            Acceleration::PreferSoftware => {
                crate::software::SoftwareAvcBackend::supports(&config.codec)
            }
        }
    }

    fn create(
        &self,
        config: &EncoderConfig,
        accel: Acceleration,
    ) -> Result<Box<dyn CodecBackend>, EncodeError> {
        match accel {
            Acceleration::PreferHardware => Err(EncodeError::EncoderFailed(
                "no hardware encode bridge linked".to_string(),
            )),
            Acceleration::PreferSoftware => Ok(Box::new(
                crate::software::SoftwareAvcBackend::new(config.clone())?,
            )),
        }
    }
}
