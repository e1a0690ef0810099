//! Run a monitoring session until interrupted.

use std::io::BufRead;

use anyhow::Context;
use tokio::sync::oneshot;

use examwatch_capture_engine::{MonitorSession, SessionReport};
use examwatch_common::config::AppConfig;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    let region = config.capture.region;
    println!("Starting monitoring session");
    println!("  Webcam: index {}", config.capture.webcam_index);
    println!(
        "  Screen region: {}x{} at ({}, {})",
        region.width, region.height, region.left, region.top
    );
    println!("  Target rate: {} fps", config.capture.target_fps);
    println!("  Event log: {}", config.event_log.path.display());
    println!("  Model: {}", config.detection.model_path.display());
    println!();

    let event_log = config.event_log.path.clone();
    let mut session = MonitorSession::new(config);

    session
        .start()
        .await
        .context("Monitoring could not start")?;

    println!("Press Ctrl+C, or type q and Enter, to stop...");
    println!();

    let quit = spawn_quit_listener(std::io::BufReader::new(std::io::stdin()));
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
        () = wait_for_quit(quit) => {}
    }

    println!();
    if let Some(report) = session.shutdown().await {
        print_summary(&report, &event_log);
    }

    Ok(())
}

/// Watch `input` for a line reading `q` on a detached thread.
///
/// The thread is never joined, so a read still blocked on the terminal does
/// not hold up process exit. The receiver errors if input ends first.
fn spawn_quit_listener<R>(input: R) -> oneshot::Receiver<()>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("quit-listener".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        let _ = tx.send(());
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Quit key unavailable; use Ctrl+C");
    }
    rx
}

/// Resolve once the listener sees `q`. Never resolves if input closed first.
async fn wait_for_quit(quit: oneshot::Receiver<()>) {
    if quit.await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_summary(report: &SessionReport, event_log: &std::path::Path) {
    let stats = &report.loop_stats;
    println!("Session summary");
    println!("  Started: {}", report.started_at);
    println!("  Duration: {:.1}s", report.duration.as_secs_f64());
    println!(
        "  Capture cycles: {} ({} delivered, {} skipped, {} over budget)",
        stats.cycles, stats.delivered, stats.skipped, stats.overruns
    );
    println!(
        "  Missing frames: webcam {}, screen {}",
        stats.webcam_misses, stats.screen_misses
    );
    println!("  Effective rate: {:.1} fps", report.effective_fps());
    match report.events_logged {
        Some(events) => println!("  Input events logged: {events} ({})", event_log.display()),
        None => println!("  Input events logged: none (input capture was unavailable)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    /// Input that blocks forever, like an idle terminal.
    struct IdleTerminal;

    impl Read for IdleTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    #[tokio::test]
    async fn q_line_requests_quit() {
        let quit = spawn_quit_listener(Cursor::new("status\n Q \n"));
        tokio::time::timeout(Duration::from_secs(5), wait_for_quit(quit))
            .await
            .expect("q should stop the session");
    }

    #[tokio::test]
    async fn closed_input_never_requests_quit() {
        let quit = spawn_quit_listener(Cursor::new("status\n"));
        let waited = tokio::time::timeout(Duration::from_millis(100), wait_for_quit(quit)).await;
        assert!(waited.is_err());
    }

    #[test]
    fn blocked_input_does_not_hold_up_runtime_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let quit = spawn_quit_listener(std::io::BufReader::new(IdleTerminal));
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(50)) => {}
                () = wait_for_quit(quit) => panic!("idle input cannot request quit"),
            }
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }
}
