//! Input hook for platforms without a native implementation yet.

use examwatch_common::error::ExamwatchResult;

use crate::hooks::{EventSender, InputHook};

/// Accepts registration but never reports input.
///
/// Holds the sender until unregistered so the event log stays open for the
/// whole session, even though it only ever contains the header.
pub struct NullHook {
    events: Option<EventSender>,
}

impl NullHook {
    pub fn new() -> Self {
        Self { events: None }
    }
}

impl Default for NullHook {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHook for NullHook {
    fn register(&mut self, events: EventSender) -> ExamwatchResult<()> {
        tracing::warn!(
            "Input capture for this platform is not implemented yet; the event log will stay empty"
        );
        self.events = Some(events);
        Ok(())
    }

    fn unregister(&mut self) {
        self.events = None;
    }

    fn name(&self) -> &str {
        "null"
    }
}
