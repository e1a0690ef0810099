//! Clock and pacing utilities.
//!
//! All pacing uses the monotonic clock; wall-clock time is only recorded
//! for display and for stamping captured data.

use std::time::{Duration, Instant};

use chrono::Local;

use crate::error::{ExamwatchError, ExamwatchResult};

/// A session clock that provides monotonic elapsed time relative to
/// the moment the session started.
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the session started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SessionClock {
    /// Create a new session clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Local::now().to_rfc3339(),
        }
    }

    /// Elapsed time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Per-cycle frame-rate budget.
///
/// Each cycle is paced independently: a cycle that finishes early sleeps for
/// the rest of its budget, a cycle that overruns proceeds immediately and the
/// overrun is never paid back by later cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePacer {
    budget: Duration,
}

impl FramePacer {
    /// Create a pacer targeting `fps` cycles per second.
    pub fn from_rate(fps: f64) -> ExamwatchResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ExamwatchError::config(format!(
                "Target frame rate must be a positive number, got {fps}"
            )));
        }
        Ok(Self {
            budget: Duration::from_secs_f64(1.0 / fps),
        })
    }

    /// Create a pacer from an explicit per-cycle budget.
    pub fn from_budget(budget: Duration) -> Self {
        Self { budget }
    }

    /// The per-cycle time budget (`1 / fps`).
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// How long to sleep after a cycle whose work took `elapsed`.
    /// Returns `None` when the budget is already spent.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.budget
            .checked_sub(elapsed)
            .filter(|rest| !rest.is_zero())
    }

    /// Whether a cycle that took `elapsed` exceeded its budget.
    pub fn is_overrun(&self, elapsed: Duration) -> bool {
        elapsed > self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = SessionClock::start();
        assert!(clock.elapsed() < Duration::from_secs(1));
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_pacer_budget_from_rate() {
        let pacer = FramePacer::from_rate(15.0).unwrap();
        let expected = Duration::from_secs_f64(1.0 / 15.0);
        assert_eq!(pacer.budget(), expected);
    }

    #[test]
    fn test_pacer_rejects_non_positive_rates() {
        assert!(FramePacer::from_rate(0.0).is_err());
        assert!(FramePacer::from_rate(-5.0).is_err());
        assert!(FramePacer::from_rate(f64::NAN).is_err());
        assert!(FramePacer::from_rate(f64::INFINITY).is_err());
    }

    #[test]
    fn test_pacer_sleeps_rest_of_budget() {
        let pacer = FramePacer::from_budget(Duration::from_millis(50));
        assert_eq!(
            pacer.remaining(Duration::from_millis(20)),
            Some(Duration::from_millis(30))
        );
        assert!(!pacer.is_overrun(Duration::from_millis(20)));
    }

    #[test]
    fn test_pacer_never_sleeps_after_overrun() {
        let pacer = FramePacer::from_budget(Duration::from_millis(50));
        assert_eq!(pacer.remaining(Duration::from_millis(50)), None);
        assert_eq!(pacer.remaining(Duration::from_millis(80)), None);
        assert!(pacer.is_overrun(Duration::from_millis(80)));
    }

    proptest! {
        #[test]
        fn pacer_sleep_plus_work_never_exceeds_budget(
            budget_us in 1u64..1_000_000,
            elapsed_us in 0u64..2_000_000,
        ) {
            let pacer = FramePacer::from_budget(Duration::from_micros(budget_us));
            let elapsed = Duration::from_micros(elapsed_us);
            match pacer.remaining(elapsed) {
                Some(rest) => prop_assert_eq!(rest + elapsed, pacer.budget()),
                None => prop_assert!(elapsed >= pacer.budget()),
            }
        }
    }
}
