//! Progress reporting.

use std::time::Duration;

use crossbeam::channel::Sender;

/// Snapshot emitted after each encoded frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    /// Frames completed so far (1-based after the first frame).
    pub current_frame: u64,
    pub total_frames: u64,
    /// `current_frame / total_frames`, clamped to `[0, 1]`.
    pub fraction: f64,
    /// Throughput-based estimate of remaining wall time; 0 until the
    /// first frame lands.
    pub est_remaining_us: u64,
}

impl ProgressEvent {
    pub fn new(current_frame: u64, total_frames: u64, est_remaining_us: u64) -> Self {
        let fraction = if total_frames == 0 {
            0.0
        } else {
            (current_frame as f64 / total_frames as f64).clamp(0.0, 1.0)
        };
        Self {
            current_frame,
            total_frames,
            fraction,
            est_remaining_us,
        }
    }
}

/// Optional observer of export progress. Emission must never block or
/// fail the export.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: ProgressEvent);
}

/// Sink forwarding events over a bounded channel; events are dropped when
/// the receiver lags (latest-wins for a UI, never backpressure).
pub struct ChannelProgress(pub Sender<ProgressEvent>);

impl ProgressSink for ChannelProgress {
    fn emit(&mut self, event: ProgressEvent) {
        let _ = self.0.try_send(event);
    }
}

/// Estimate remaining time from throughput so far.
pub fn estimate_remaining_us(frames_done: u64, total_frames: u64, elapsed: Duration) -> u64 {
    if frames_done == 0 {
        return 0;
    }
    let remaining = total_frames.saturating_sub(frames_done) as u128;
    let per_frame_us = elapsed.as_micros() / frames_done as u128;
    (remaining * per_frame_us) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(ProgressEvent::new(50, 100, 0).fraction, 0.5);
        assert_eq!(ProgressEvent::new(0, 0, 0).fraction, 0.0);
        assert_eq!(ProgressEvent::new(200, 100, 0).fraction, 1.0);
    }

    #[test]
    fn estimate_from_throughput() {
        // 100 of 300 frames in 5s -> 200 left at 50ms/frame -> 10s.
        let est = estimate_remaining_us(100, 300, Duration::from_secs(5));
        assert_eq!(est, 10_000_000);
    }

    #[test]
    fn estimate_zero_before_first_frame() {
        assert_eq!(estimate_remaining_us(0, 300, Duration::from_secs(5)), 0);
    }

    #[test]
    fn estimate_zero_when_done() {
        assert_eq!(estimate_remaining_us(300, 300, Duration::from_secs(10)), 0);
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut sink = ChannelProgress(tx);
        sink.emit(ProgressEvent::new(1, 10, 0));
        sink.emit(ProgressEvent::new(2, 10, 0)); // dropped, channel full
        assert_eq!(rx.try_recv().unwrap().current_frame, 1);
        assert!(rx.try_recv().is_err());
    }
}
