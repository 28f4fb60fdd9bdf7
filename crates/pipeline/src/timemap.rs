//! Effective⇄source time mapping.
//!
//! The output ("effective") timeline is the source timeline with the trim
//! set excised. The pipeline iterates output frames as a dense sequence
//! `0, period, 2·period, …` and maps each effective timestamp to the
//! source time the compositor should sample; mapping in this direction
//! means no skip logic anywhere downstream.

use thiserror::Error;

use rf_common::{Rational, TrimSet};

/// The trim set removes at least as much time as the source has.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("trims remove {trimmed_us} µs of a {source_duration_us} µs source")]
pub struct InvalidTrim {
    pub trimmed_us: u64,
    pub source_duration_us: u64,
}

/// Bijection between effective time and source time for one trim set.
#[derive(Clone, Debug)]
pub struct TimeMap {
    fps: Rational,
    period_us: u64,
    trims: TrimSet,
}

impl TimeMap {
    /// Build a map from the output frame rate and a raw trim set. The
    /// trims are normalized here (sorted, overlapping/abutting merged).
    pub fn new(fps: Rational, trims: &TrimSet) -> Self {
        Self {
            fps,
            period_us: fps.frame_period_us(),
            trims: trims.normalized(),
        }
    }

    pub fn frame_period_us(&self) -> u64 {
        self.period_us
    }

    /// The normalized trim set this map was built over.
    pub fn trims(&self) -> &TrimSet {
        &self.trims
    }

    /// Output duration: source duration minus total trimmed time. Trims
    /// removing more than the source has are an error; removing exactly
    /// all of it yields zero (the pipeline reports that as an empty
    /// output, not an invalid trim).
    pub fn effective_duration_us(&self, source_duration_us: u64) -> Result<u64, InvalidTrim> {
        let trimmed_us = self.trims.total_len_us();
        if trimmed_us > source_duration_us {
            return Err(InvalidTrim {
                trimmed_us,
                source_duration_us,
            });
        }
        Ok(source_duration_us - trimmed_us)
    }

    /// Number of output frames: `ceil(effective_duration · fps)`.
    ///
    /// The last frame's mapped source time may land past the end of the
    /// clip; readers clamp to the final available frame.
    pub fn total_frames(&self, source_duration_us: u64) -> Result<u64, InvalidTrim> {
        let effective = self.effective_duration_us(source_duration_us)?;
        Ok(self.fps.frames_covering_us(effective))
    }

    /// Map an effective timestamp to the source time to sample.
    ///
    /// Monotonic non-decreasing, and never lands inside a trim interval:
    /// each trim whose start lies at or before the running candidate
    /// pushes the candidate past itself.
    pub fn source_time_of(&self, effective_ts_us: u64) -> u64 {
        let mut candidate = effective_ts_us;
        for trim in self.trims.iter() {
            if trim.start_us <= candidate {
                candidate += trim.len_us();
            }
        }
        candidate
    }
}
