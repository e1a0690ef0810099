//! Check system capabilities.

use std::path::Path;

use examwatch_capture_engine::classifier::{ClassifierLoader, WeightsFileLoader};
use examwatch_capture_engine::pipeline::init_gstreamer;
use examwatch_common::config::AppConfig;

/// A system capability that a monitoring session may need.
#[derive(Debug, Clone)]
struct Capability {
    name: &'static str,
    description: String,
    available: bool,
    required: bool,
    fix_instructions: Option<&'static str>,
}

impl Capability {
    fn new(name: &'static str, description: impl Into<String>, available: bool) -> Self {
        Self {
            name,
            description: description.into(),
            available,
            required: true,
            fix_instructions: None,
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn fix(mut self, fix: &'static str) -> Self {
        if !self.available {
            self.fix_instructions = Some(fix);
        }
        self
    }
}

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("ExamWatch System Check");
    println!("{}", "=".repeat(50));

    let capabilities = vec![
        check_gstreamer(),
        check_webcam(config.capture.webcam_index),
        check_display(),
        check_input_devices(),
        check_event_log(&config.event_log.path),
        check_model(&config.detection.model_path),
    ];
    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. ExamWatch is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}

fn check_gstreamer() -> Capability {
    let result = init_gstreamer();
    let description = match &result {
        Ok(()) => "GStreamer runtime for webcam and screen capture".to_string(),
        Err(e) => e.to_string(),
    };
    Capability::new("GStreamer", description, result.is_ok())
        .fix("Install GStreamer: sudo apt install gstreamer1.0-plugins-base gstreamer1.0-plugins-good")
}

#[cfg(target_os = "linux")]
fn check_webcam(index: u32) -> Capability {
    use examwatch_capture_engine::pipeline::{webcam_device_name, webcam_device_node};

    let name = webcam_device_name(index);
    let description = match &name {
        Some(name) => format!("{} ({name})", webcam_device_node(index)),
        None => format!("{} not found", webcam_device_node(index)),
    };
    Capability::new("Webcam", description, name.is_some())
        .optional()
        .fix("Connect a webcam or pick another --webcam-index (v4l2-ctl --list-devices)")
}

#[cfg(not(target_os = "linux"))]
fn check_webcam(index: u32) -> Capability {
    Capability::new("Webcam", format!("device index {index} (probed at run time)"), true).optional()
}

fn check_display() -> Capability {
    let available = cfg!(target_os = "windows") || std::env::var_os("DISPLAY").is_some();
    Capability::new("Screen Region Capture", "X11 display for ximagesrc", available)
        .fix("Run inside a graphical session with an X11 (or XWayland) DISPLAY")
}

#[cfg(target_os = "linux")]
fn check_input_devices() -> Capability {
    use examwatch_input_tracker::hooks::linux::EvdevHook;

    Capability::new(
        "Input Device Access",
        "Readable keyboard/mouse devices under /dev/input (evdev)",
        EvdevHook::is_supported(),
    )
    .optional()
    .fix("Add user to input group: sudo usermod -aG input $USER (logout required)")
}

#[cfg(not(target_os = "linux"))]
fn check_input_devices() -> Capability {
    Capability::new(
        "Input Device Access",
        "Input capture is not implemented on this platform",
        false,
    )
    .optional()
}

fn check_event_log(path: &Path) -> Capability {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let writable = match dir {
        Some(dir) => std::fs::create_dir_all(dir)
            .and_then(|()| std::fs::metadata(dir))
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false),
        None => true,
    };
    Capability::new(
        "Event Log",
        format!("Behavioral log at {}", path.display()),
        writable,
    )
    .optional()
    .fix("Choose a writable location with --log-file")
}

fn check_model(path: &Path) -> Capability {
    let result = WeightsFileLoader.load(path);
    let description = match &result {
        Ok(_) => format!("Classifier weights at {}", path.display()),
        Err(e) => e.to_string(),
    };
    Capability::new("Frame Classifier", description, result.is_ok())
        .fix("Place the model weights there or pass --model PATH")
}

/// Print a user-friendly capability report.
fn print_capability_report(capabilities: &[Capability]) {
    println!("ExamWatch System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
