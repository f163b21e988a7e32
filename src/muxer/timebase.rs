//! Pause-aware timebase reconciliation
//!
//! Maps raw source presentation timestamps to output timestamps so the
//! finished file contains no gaps for time spent paused. Pause boundaries
//! are captured lazily from the frames themselves: a pause request only
//! sets a flag, and the first frame observed while paused pins the pause
//! start time. The first frame observed after resume closes the interval.

use std::time::Duration;

/// Tracks pause intervals and rewrites raw timestamps into output time.
#[derive(Debug, Default)]
pub struct TimebaseReconciler {
    /// Whether the pipeline is currently paused
    paused: bool,

    /// Raw time of the first frame seen during the current pause, if any
    pause_started: Option<Duration>,

    /// Sum of all completed pause intervals. Only ever grows.
    paused_total: Duration,
}

impl TimebaseReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a frame's raw timestamp.
    ///
    /// Returns the adjusted output timestamp, or `None` when the frame
    /// arrived during a pause and must be dropped. Repeated pause/resume
    /// requests with no frames in between collapse to nothing because the
    /// pause-start marker only moves on frame observation.
    pub fn observe(&mut self, raw: Duration) -> Option<Duration> {
        if self.paused {
            if self.pause_started.is_none() {
                self.pause_started = Some(raw);
            }
            return None;
        }

        if let Some(started) = self.pause_started.take() {
            let gap = raw.saturating_sub(started);
            self.paused_total += gap;
            tracing::debug!(
                "closed pause interval of {}ms (total paused {}ms)",
                gap.as_millis(),
                self.paused_total.as_millis()
            );
        }

        Some(raw.saturating_sub(self.paused_total))
    }

    /// Flag the timebase as paused. Takes effect on the next observed frame.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Clear the pause flag. The pending interval (if a frame pinned one)
    /// closes on the next observed frame.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Total wall-clock time excluded from the output so far
    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_passthrough_without_pause() {
        let mut tb = TimebaseReconciler::new();
        assert_eq!(tb.observe(ms(100)), Some(ms(100)));
        assert_eq!(tb.observe(ms(133)), Some(ms(133)));
        assert_eq!(tb.paused_total(), ms(0));
    }

    #[test]
    fn test_frames_dropped_while_paused() {
        let mut tb = TimebaseReconciler::new();
        assert_eq!(tb.observe(ms(100)), Some(ms(100)));
        tb.pause();
        assert_eq!(tb.observe(ms(200)), None);
        assert_eq!(tb.observe(ms(300)), None);
    }

    #[test]
    fn test_gap_removed_after_resume() {
        let mut tb = TimebaseReconciler::new();
        assert_eq!(tb.observe(ms(500)), Some(ms(500)));
        tb.pause();
        // Pause start pinned by the first paused frame.
        assert_eq!(tb.observe(ms(500)), None);
        assert_eq!(tb.observe(ms(1200)), None);
        tb.resume();
        // First frame after resume lands exactly where the last written
        // frame left off: 2000 - (2000 - 500) = 500.
        assert_eq!(tb.observe(ms(2000)), Some(ms(500)));
        assert_eq!(tb.paused_total(), ms(1500));
        assert_eq!(tb.observe(ms(2033)), Some(ms(533)));
    }

    #[test]
    fn test_multiple_pause_cycles_accumulate() {
        let mut tb = TimebaseReconciler::new();
        tb.observe(ms(0));
        tb.pause();
        tb.observe(ms(100));
        tb.resume();
        assert_eq!(tb.observe(ms(200)), Some(ms(100)));
        tb.pause();
        tb.observe(ms(300));
        tb.resume();
        assert_eq!(tb.observe(ms(500)), Some(ms(200)));
        assert_eq!(tb.paused_total(), ms(300));
    }

    #[test]
    fn test_pause_resume_without_frames_is_noop() {
        let mut tb = TimebaseReconciler::new();
        tb.observe(ms(100));
        tb.pause();
        tb.resume();
        tb.pause();
        tb.resume();
        // No frame ever pinned a pause start, so nothing accumulates.
        assert_eq!(tb.observe(ms(200)), Some(ms(200)));
        assert_eq!(tb.paused_total(), ms(0));
    }

    #[test]
    fn test_pause_before_any_frame() {
        let mut tb = TimebaseReconciler::new();
        tb.pause();
        assert_eq!(tb.observe(ms(50)), None);
        tb.resume();
        // The pre-start pause interval is excluded, so the session still
        // begins at the first written frame.
        assert_eq!(tb.observe(ms(250)), Some(ms(50)));
    }

    #[test]
    fn test_repeated_pause_requests_keep_first_marker() {
        let mut tb = TimebaseReconciler::new();
        tb.observe(ms(0));
        tb.pause();
        tb.observe(ms(100));
        tb.pause();
        tb.observe(ms(200));
        tb.resume();
        // Interval measured from the first paused frame, not the second.
        assert_eq!(tb.observe(ms(300)), Some(ms(100)));
        assert_eq!(tb.paused_total(), ms(200));
    }
}
