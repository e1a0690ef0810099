//! evdev input hook for Linux.
//!
//! Reads `/dev/input/event*` directly, so it works under both X11 and
//! Wayland but needs read access to the devices (usually membership in the
//! `input` group).
//!
//! Events carry the kernel's timestamp. Each device has its own reader
//! thread, so rows from two devices within one poll interval may land in
//! the log slightly out of timestamp order.

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use evdev::{Device, InputEvent as DeviceEvent, InputEventKind, Key, RelativeAxisType};

use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_common::lifecycle::StopToken;

use super::{EventSender, InputHook, RawNotification};

/// Upper bound on how long a reader thread waits before rechecking its stop token.
const POLL_TIMEOUT_MS: libc::c_int = 250;

const MOUSE_BUTTONS: [(Key, &str); 5] = [
    (Key::BTN_LEFT, "left"),
    (Key::BTN_RIGHT, "right"),
    (Key::BTN_MIDDLE, "middle"),
    (Key::BTN_SIDE, "side"),
    (Key::BTN_EXTRA, "extra"),
];

pub struct EvdevHook {
    desktop_width: u32,
    desktop_height: u32,
    stop: StopToken,
    readers: Vec<JoinHandle<()>>,
    events: Option<EventSender>,
}

impl EvdevHook {
    pub fn new(desktop_width: u32, desktop_height: u32) -> Self {
        Self {
            desktop_width,
            desktop_height,
            stop: StopToken::new(),
            readers: Vec::new(),
            events: None,
        }
    }

    /// Whether any keyboard or mouse device is readable by this process.
    pub fn is_supported() -> bool {
        !input_devices().is_empty()
    }
}

impl InputHook for EvdevHook {
    fn register(&mut self, events: EventSender) -> ExamwatchResult<()> {
        if self.events.is_some() {
            return Err(ExamwatchError::input_tracking("evdev hook already registered"));
        }

        let devices = input_devices();
        if devices.is_empty() {
            return Err(ExamwatchError::input_tracking(
                "No readable keyboard or mouse devices under /dev/input. Fix: sudo usermod -aG input $USER && log out/in",
            ));
        }

        self.stop = StopToken::new();
        for (path, device) in devices {
            let name = device.name().unwrap_or("unnamed").to_string();
            tracing::info!(device = %path.display(), %name, "Listening to input device");

            let pointer = PointerState::new(self.desktop_width, self.desktop_height);
            let sender = events.clone();
            let stop = self.stop.clone();
            let reader = std::thread::Builder::new()
                .name(format!("input-hook-{}", path.display()))
                .spawn(move || read_device(device, pointer, sender, stop))
                .map_err(|e| {
                    ExamwatchError::input_tracking(format!("Failed to spawn input reader: {e}"))
                })?;
            self.readers.push(reader);
        }

        self.events = Some(events);
        Ok(())
    }

    fn unregister(&mut self) {
        self.stop.stop();
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                tracing::warn!("Input reader thread panicked");
            }
        }
        if self.events.take().is_some() {
            tracing::debug!("evdev hook unregistered");
        }
    }

    fn name(&self) -> &str {
        "evdev"
    }
}

impl Drop for EvdevHook {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Devices that report letter keys or mouse buttons.
fn input_devices() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| {
            device.supported_keys().map_or(false, |keys| {
                keys.contains(Key::KEY_A) || keys.contains(Key::BTN_LEFT)
            })
        })
        .collect()
}

fn read_device(mut device: Device, mut pointer: PointerState, events: EventSender, stop: StopToken) {
    let fd = device.as_raw_fd();

    while !stop.is_stopped() && events.is_connected() {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pfd, 1, POLL_TIMEOUT_MS) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            tracing::warn!(error = %err, "poll on input device failed");
            break;
        }
        if ready == 0 {
            continue;
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            tracing::debug!("Input device went away");
            break;
        }

        let batch: Vec<DeviceEvent> = match device.fetch_events() {
            Ok(iter) => iter.collect(),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading input device");
                break;
            }
        };

        for event in batch {
            if let Some(raw) = pointer.translate(&event) {
                events.notify_at(event_time(&event), raw);
            }
        }
    }
}

/// When the kernel saw the event.
fn event_time(event: &DeviceEvent) -> DateTime<Local> {
    DateTime::<Local>::from(event.timestamp())
}

/// Per-device pointer position, integrated from relative motion.
struct PointerState {
    x: i32,
    y: i32,
    max_x: i32,
    max_y: i32,
}

impl PointerState {
    fn new(desktop_width: u32, desktop_height: u32) -> Self {
        let max_x = desktop_width.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_y = desktop_height.saturating_sub(1).min(i32::MAX as u32) as i32;
        Self {
            x: max_x / 2,
            y: max_y / 2,
            max_x,
            max_y,
        }
    }

    fn translate(&mut self, event: &DeviceEvent) -> Option<RawNotification> {
        match event.kind() {
            InputEventKind::Key(key) => {
                // 2 is autorepeat; only real transitions are logged.
                let pressed = match event.value() {
                    0 => false,
                    1 => true,
                    _ => return None,
                };
                match mouse_button_name(key) {
                    Some(button) => Some(RawNotification::Button {
                        button: button.to_string(),
                        pressed,
                        x: self.x,
                        y: self.y,
                    }),
                    None => Some(RawNotification::Key {
                        label: key_label(key),
                        pressed,
                    }),
                }
            }
            InputEventKind::RelAxis(axis) => {
                if axis == RelativeAxisType::REL_X {
                    self.x = self.x.saturating_add(event.value()).clamp(0, self.max_x);
                } else if axis == RelativeAxisType::REL_Y {
                    self.y = self.y.saturating_add(event.value()).clamp(0, self.max_y);
                } else {
                    return None;
                }
                Some(RawNotification::Motion {
                    x: self.x,
                    y: self.y,
                })
            }
            _ => None,
        }
    }
}

fn mouse_button_name(key: Key) -> Option<&'static str> {
    MOUSE_BUTTONS
        .iter()
        .find(|(button, _)| *button == key)
        .map(|(_, name)| *name)
}

/// `KEY_LEFTSHIFT` -> `leftshift`, `KEY_A` -> `a`.
fn key_label(key: Key) -> String {
    let name = format!("{key:?}");
    name.strip_prefix("KEY_")
        .unwrap_or(&name)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    fn key_event(key: Key, value: i32) -> DeviceEvent {
        DeviceEvent::new(EventType::KEY, key.code(), value)
    }

    fn rel_event(axis: RelativeAxisType, value: i32) -> DeviceEvent {
        DeviceEvent::new(EventType::RELATIVE, axis.0, value)
    }

    #[test]
    fn key_transitions_map_to_labels() {
        let mut pointer = PointerState::new(1920, 1080);
        assert_eq!(
            pointer.translate(&key_event(Key::KEY_A, 1)),
            Some(RawNotification::Key {
                label: "a".to_string(),
                pressed: true
            })
        );
        assert_eq!(
            pointer.translate(&key_event(Key::KEY_LEFTSHIFT, 0)),
            Some(RawNotification::Key {
                label: "leftshift".to_string(),
                pressed: false
            })
        );
    }

    #[test]
    fn autorepeat_is_ignored() {
        let mut pointer = PointerState::new(1920, 1080);
        assert_eq!(pointer.translate(&key_event(Key::KEY_A, 2)), None);
    }

    #[test]
    fn clicks_use_integrated_position() {
        let mut pointer = PointerState::new(100, 100);
        pointer.translate(&rel_event(RelativeAxisType::REL_X, -1000));
        pointer.translate(&rel_event(RelativeAxisType::REL_Y, 20));

        assert_eq!(
            pointer.translate(&key_event(Key::BTN_LEFT, 1)),
            Some(RawNotification::Button {
                button: "left".to_string(),
                pressed: true,
                x: 0,
                y: 69,
            })
        );
    }

    #[test]
    fn motion_is_clamped_to_desktop() {
        let mut pointer = PointerState::new(100, 50);
        let raw = pointer.translate(&rel_event(RelativeAxisType::REL_X, 10_000));
        assert_eq!(raw, Some(RawNotification::Motion { x: 99, y: 24 }));
    }

    #[test]
    fn events_are_stamped_with_kernel_time() {
        let event = DeviceEvent::from(libc::input_event {
            time: libc::timeval {
                tv_sec: 1_700_000_000,
                tv_usec: 250_000,
            },
            type_: EventType::KEY.0,
            code: Key::KEY_A.code(),
            value: 1,
        });

        let expected = DateTime::from_timestamp(1_700_000_000, 250_000_000)
            .unwrap()
            .with_timezone(&Local);
        assert_eq!(event_time(&event), expected);
    }

    #[test]
    fn unregister_without_register_is_harmless() {
        let mut hook = EvdevHook::new(1920, 1080);
        hook.unregister();
        hook.unregister();
    }
}
