//! Cooperative cancellation and component lifecycle state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State of a long-running component (capture loop, event capturer, session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created but not started.
    Idle,
    /// Started and doing work.
    Running,
    /// Stop requested; waiting for in-flight work to finish.
    Stopping,
    /// Fully stopped, resources released.
    Stopped,
}

impl LifecycleState {
    /// Whether a stop request still has something to do.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

/// Shared stop signal, observed at defined poll points.
///
/// Stopping is one-way: once [`StopToken::stop`] has been called every clone
/// observes it. Writes use `Release` and reads use `Acquire`, so anything the
/// stopping side wrote before signalling is visible to the observer.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` if this call was the first request.
    pub fn stop(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_visible_to_clones_and_only_first_call_wins() {
        let token = StopToken::new();
        let observer = token.clone();
        assert!(!observer.is_stopped());

        assert!(token.stop());
        assert!(!token.stop());
        assert!(observer.is_stopped());
    }

    #[test]
    fn active_states() {
        assert!(!LifecycleState::Idle.is_active());
        assert!(LifecycleState::Running.is_active());
        assert!(LifecycleState::Stopping.is_active());
        assert!(!LifecycleState::Stopped.is_active());
    }
}
