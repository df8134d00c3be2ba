use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::Result;

/// Frame rate assumed when a source reports none.
pub const FALLBACK_FPS: f64 = 25.0;

/// Exit status for a second Ctrl-C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// `fps` when it is a usable rate, [`FALLBACK_FPS`] otherwise.
pub fn usable_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Holds a loop to a target frame rate. Waits with `spin_sleep` so short
/// frame budgets are hit accurately.
pub struct FpsLimiter {
    fps_control: Instant,
    fps_wait: Duration,
}

impl FpsLimiter {
    pub fn new(fps: f64) -> Self {
        let fps = usable_fps(fps);
        Self {
            fps_control: Instant::now(),
            fps_wait: Duration::from_secs_f64(1.0 / fps),
        }
    }

    pub fn frame_budget(&self) -> Duration {
        self.fps_wait
    }

    /// Sleeps out whatever is left of the current frame budget and starts the
    /// next one.
    pub fn wait(&mut self) {
        let elapsed = self.fps_control.elapsed();

        if self.fps_wait > elapsed {
            spin_sleep::sleep(self.fps_wait - elapsed);
        }

        self.fps_control = Instant::now();
    }
}

/// Latched stop request shared between the frame loop and whoever wants it
/// to end. Checked only between frames.
#[derive(Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Turns the first Ctrl-C into a stop request so the run can finish its
/// outputs. A second Ctrl-C exits immediately.
pub fn stop_on_interrupt(stop: &StopSignal) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let stop = stop.clone();

    thread::Builder::new()
        .name("interrupt-watch".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "cannot listen for Ctrl-C");
                    return;
                }
                info!("interrupt received, stopping after the current frame");
                stop.request_stop();

                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("second interrupt, exiting without finishing outputs");
                    process::exit(INTERRUPTED_EXIT_CODE);
                }
            });
        })?;

    Ok(())
}
