//! Source probing — turns a URI into a reader.
//!
//! URI shape for generated clips:
//! `synth:<pattern>?dur=<µs>&w=<px>&h=<px>&fps=<num>[/<den>]`,
//! e.g. `synth:smpte?dur=3000000&w=1280&h=720&fps=30`. Omitted parameters
//! default to a 10 s 1280x720 clip at 30 fps.

use std::sync::Arc;

use tracing::info;

use rf_common::{FrameLedger, Rational, Resolution, SourceError, SourceReader};

use crate::synthetic::{Pattern, SyntheticSource};

const DEFAULT_DURATION_US: u64 = 10_000_000;
const DEFAULT_RESOLUTION: Resolution = Resolution::HD_720;
const DEFAULT_FPS: Rational = Rational::FPS_30;

/// Open a source by URI.
///
/// Frames decoded by the returned reader register in `ledger`.
pub fn open_source(
    uri: &str,
    ledger: Arc<FrameLedger>,
) -> Result<Box<dyn SourceReader>, SourceError> {
    let (scheme, rest) = uri
        .split_once(':')
        .ok_or_else(|| SourceError::SourceUnavailable(format!("URI without scheme: {uri:?}")))?;

    match scheme {
        "synth" => {
            let reader = open_synthetic(rest.trim_start_matches("//"), ledger)?;
            info!(uri, "Source opened");
            Ok(reader)
        }
        other => Err(SourceError::SourceUnavailable(format!(
            "no reader for scheme {other:?}"
        ))),
    }
}

fn open_synthetic(
    rest: &str,
    ledger: Arc<FrameLedger>,
) -> Result<Box<dyn SourceReader>, SourceError> {
    let (name, query) = match rest.split_once('?') {
        Some((name, query)) => (name, query),
        None => (rest, ""),
    };

    let pattern = Pattern::from_name(name)
        .ok_or_else(|| SourceError::UnsupportedFormat(format!("unknown pattern {name:?}")))?;

    let mut duration_us = DEFAULT_DURATION_US;
    let mut resolution = DEFAULT_RESOLUTION;
    let mut fps = DEFAULT_FPS;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            SourceError::UnsupportedFormat(format!("malformed parameter {pair:?}"))
        })?;
        match key {
            "dur" => duration_us = parse_u64(key, value)?,
            "w" => resolution.width = parse_u64(key, value)? as u32,
            "h" => resolution.height = parse_u64(key, value)? as u32,
            "fps" => fps = parse_fps(value)?,
            _ => {
                return Err(SourceError::UnsupportedFormat(format!(
                    "unknown parameter {key:?}"
                )))
            }
        }
    }

    let source = SyntheticSource::new(pattern, resolution, duration_us, fps, ledger)?;
    Ok(Box::new(source))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, SourceError> {
    value.parse::<u64>().map_err(|_| {
        SourceError::UnsupportedFormat(format!("parameter {key}={value:?} is not an integer"))
    })
}

fn parse_fps(value: &str) -> Result<Rational, SourceError> {
    let bad = || SourceError::UnsupportedFormat(format!("bad fps {value:?}"));
    match value.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<u32>().map_err(|_| bad())?;
            let den = den.parse::<u32>().map_err(|_| bad())?;
            if num == 0 || den == 0 {
                return Err(bad());
            }
            Ok(Rational { num, den })
        }
        None => {
            let num = value.parse::<u32>().map_err(|_| bad())?;
            if num == 0 {
                return Err(bad());
            }
            Ok(Rational { num, den: 1 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Arc<FrameLedger> {
        FrameLedger::new()
    }

    #[test]
    fn opens_with_full_parameters() {
        let reader =
            open_source("synth:smpte?dur=3000000&w=1280&h=720&fps=30", ledger()).unwrap();
        let info = reader.info();
        assert_eq!(info.duration_us, 3_000_000);
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
    }

    #[test]
    fn opens_with_defaults() {
        let reader = open_source("synth:gradient", ledger()).unwrap();
        let info = reader.info();
        assert_eq!(info.duration_us, 10_000_000);
        assert_eq!(info.width, 1280);
    }

    #[test]
    fn accepts_double_slash_form() {
        assert!(open_source("synth://checker?dur=1000000", ledger()).is_ok());
    }

    #[test]
    fn accepts_rational_fps() {
        assert!(open_source("synth:smpte?fps=30000/1001", ledger()).is_ok());
    }

    #[test]
    fn unknown_scheme_is_unavailable() {
        let err = open_source("file:/clips/a.mp4", ledger()).unwrap_err();
        assert!(matches!(err, SourceError::SourceUnavailable(_)));
    }

    #[test]
    fn missing_scheme_is_unavailable() {
        let err = open_source("clip.mp4", ledger()).unwrap_err();
        assert!(matches!(err, SourceError::SourceUnavailable(_)));
    }

    #[test]
    fn unknown_pattern_is_unsupported() {
        let err = open_source("synth:noise", ledger()).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(_)));
    }

    #[test]
    fn malformed_parameter_is_unsupported() {
        let err = open_source("synth:smpte?dur=abc", ledger()).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(_)));
        let err = open_source("synth:smpte?fps=0", ledger()).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(_)));
    }
}
