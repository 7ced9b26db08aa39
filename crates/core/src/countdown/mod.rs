use std::time::{Duration, Instant};

use serde::Serialize;

/// Value shown by a singer's progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountdownState {
    pub visible: bool,
    /// Remaining share of the countdown, 100 down to 0.
    pub percent: f64,
}

impl CountdownState {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            percent: 0.0,
        }
    }
}

impl Default for CountdownState {
    fn default() -> Self {
        Self::hidden()
    }
}

/// Wall-clock countdown leading into a line.
///
/// The percentage is derived from elapsed wall time rather than beats so the
/// bar keeps moving smoothly when the sampled clock jitters. A countdown arms
/// at most once per approached line until [`ProgressCountdown::reset`].
#[derive(Debug, Clone)]
pub struct ProgressCountdown {
    duration: Duration,
    armed_at: Option<Instant>,
    approach: Option<usize>,
}

impl ProgressCountdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            armed_at: None,
            approach: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts the countdown for `line_index`. Returns false when this line's
    /// approach already armed one.
    pub fn arm(&mut self, now: Instant, line_index: usize) -> bool {
        if self.approach == Some(line_index) {
            return false;
        }
        self.approach = Some(line_index);
        self.armed_at = Some(now);
        true
    }

    pub fn is_running(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Stops a running countdown. The approach stays remembered so it does not
    /// re-arm for the same line.
    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    /// Stops the countdown and forgets the approach.
    pub fn reset(&mut self) {
        self.armed_at = None;
        self.approach = None;
    }

    /// Current indicator value. Hides itself once the duration has elapsed.
    pub fn sample(&mut self, now: Instant) -> CountdownState {
        let Some(armed_at) = self.armed_at else {
            return CountdownState::hidden();
        };

        let elapsed = now.saturating_duration_since(armed_at);
        if elapsed >= self.duration {
            self.armed_at = None;
            return CountdownState::hidden();
        }

        let remaining = 1.0 - elapsed.as_secs_f64() / self.duration.as_secs_f64();
        CountdownState {
            visible: true,
            percent: (remaining * 100.0).clamp(0.0, 100.0),
        }
    }
}
