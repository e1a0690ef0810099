//! OS-level input hooks.
//!
//! A hook receives raw keyboard and pointer notifications on its own threads
//! and pushes them through an [`EventSender`], which normalizes each one into
//! an [`InputEvent`] and forwards it to the event-log writer in delivery
//! order. Pointer motion is accepted from hooks but never forwarded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc::UnboundedSender;

use examwatch_common::config::InputConfig;
use examwatch_common::error::ExamwatchResult;
use examwatch_model::event::InputEvent;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(target_os = "linux"))]
pub mod non_linux;

/// Trait for OS-level input listeners.
pub trait InputHook: Send {
    /// Start delivering notifications to `events`.
    fn register(&mut self, events: EventSender) -> ExamwatchResult<()>;

    /// Stop delivering notifications and release OS resources.
    /// Must be safe to call when never registered or already unregistered.
    fn unregister(&mut self);

    /// Hook name for logging.
    fn name(&self) -> &str;
}

/// An input notification as reported by the OS, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNotification {
    Key { label: String, pressed: bool },
    Button {
        button: String,
        pressed: bool,
        x: i32,
        y: i32,
    },
    Motion { x: i32, y: i32 },
}

/// Why a notification could not be turned into an event.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("empty key label")]
    EmptyLabel,
    #[error("unprintable key label {0:?}")]
    Unprintable(String),
}

/// Turn a raw notification into a loggable event.
///
/// Returns `Ok(None)` for motion, which is intentionally not persisted.
pub fn normalize(
    at: DateTime<Local>,
    raw: RawNotification,
) -> Result<Option<InputEvent>, NormalizeError> {
    match raw {
        RawNotification::Key { label, pressed } => {
            let label = clean_label(label)?;
            Ok(Some(InputEvent::key(at, label, pressed)))
        }
        RawNotification::Button {
            button,
            pressed,
            x,
            y,
        } => {
            let button = clean_label(button)?;
            Ok(Some(InputEvent::click(at, button, pressed, x, y)))
        }
        RawNotification::Motion { .. } => Ok(None),
    }
}

fn clean_label(label: String) -> Result<String, NormalizeError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::EmptyLabel);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(NormalizeError::Unprintable(label));
    }
    Ok(trimmed.to_string())
}

/// Producer side of the hook-to-writer channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<InputEvent>,
}

impl EventSender {
    pub fn new(tx: UnboundedSender<InputEvent>) -> Self {
        Self { tx }
    }

    /// Normalize and forward one notification, stamped with the current time.
    ///
    /// Returns `true` if an event was queued for the log. Notifications that
    /// fail to normalize are dropped; so is everything once the writer has
    /// gone away.
    pub fn notify(&self, raw: RawNotification) -> bool {
        self.notify_at(Local::now(), raw)
    }

    /// Like [`notify`](Self::notify), for hooks that know when the OS saw the input.
    pub fn notify_at(&self, at: DateTime<Local>, raw: RawNotification) -> bool {
        match normalize(at, raw) {
            Ok(Some(event)) => self.tx.send(event).is_ok(),
            Ok(None) => false,
            Err(e) => {
                tracing::trace!(error = %e, "Dropping input notification");
                false
            }
        }
    }

    /// Whether the writer is still accepting events.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Scripted hook for tests: replays a fixed list of notifications on registration.
pub struct ScriptedHook {
    script: Vec<RawNotification>,
    events: Option<EventSender>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedHook {
    pub fn new(script: Vec<RawNotification>) -> Self {
        Self {
            script,
            events: None,
            releases: Default::default(),
        }
    }

    /// Create a hook that never produces notifications.
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Counter incremented each time a registration is actually torn down.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl InputHook for ScriptedHook {
    fn register(&mut self, events: EventSender) -> ExamwatchResult<()> {
        for raw in self.script.drain(..) {
            events.notify(raw);
        }
        self.events = Some(events);
        Ok(())
    }

    fn unregister(&mut self) {
        if self.events.take().is_some() {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Pick the input hook for the current platform.
pub fn detect_platform_hook(config: &InputConfig) -> Box<dyn InputHook> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::EvdevHook::new(
            config.desktop_width,
            config.desktop_height,
        ))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        Box::new(non_linux::NullHook::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examwatch_model::event::EventType;

    #[test]
    fn motion_is_not_persisted() {
        let result = normalize(Local::now(), RawNotification::Motion { x: 5, y: 5 });
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn unprintable_and_empty_labels_are_rejected() {
        let err = normalize(
            Local::now(),
            RawNotification::Key {
                label: "\u{7}".to_string(),
                pressed: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Unprintable(_)));

        let err = normalize(
            Local::now(),
            RawNotification::Key {
                label: "  ".to_string(),
                pressed: true,
            },
        )
        .unwrap_err();
        assert_eq!(err, NormalizeError::EmptyLabel);
    }

    #[test]
    fn clicks_keep_their_position() {
        let event = normalize(
            Local::now(),
            RawNotification::Button {
                button: "left".to_string(),
                pressed: true,
                x: 10,
                y: 20,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.event_type(), EventType::MouseDown);
        assert_eq!(event.position(), Some((10, 20)));
        assert_eq!(event.label(), "left");
    }

    #[test]
    fn sender_drops_bad_notifications_and_keeps_going() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = EventSender::new(tx);

        assert!(!sender.notify(RawNotification::Key {
            label: "\u{0}".to_string(),
            pressed: true,
        }));
        assert!(!sender.notify(RawNotification::Motion { x: 1, y: 1 }));
        assert!(sender.notify(RawNotification::Key {
            label: "a".to_string(),
            pressed: true,
        }));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.label(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sender_keeps_the_reported_time() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = EventSender::new(tx);
        let at = Local::now() - chrono::Duration::seconds(3);

        assert!(sender.notify_at(
            at,
            RawNotification::Key {
                label: "b".to_string(),
                pressed: false,
            }
        ));
        assert_eq!(rx.try_recv().unwrap().timestamp(), at);
    }

    #[test]
    fn scripted_hook_releases_once() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut hook = ScriptedHook::empty();
        let releases = hook.release_counter();

        hook.unregister();
        hook.register(EventSender::new(tx)).unwrap();
        hook.unregister();
        hook.unregister();

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
