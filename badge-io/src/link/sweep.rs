//! Timeout sweep thread

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::LinkCore;

/// Sweep period when no debugger is attached
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Sweep period while being debugged, so breakpoints do not burn retries
pub const DEBUG_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Wake every `interval` until the stop channel fires or disconnects
pub(super) fn sweep_loop(core: Arc<LinkCore>, stop: Receiver<()>) {
    let interval = core.sweep_interval();
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => core.sweep_at(Instant::now()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("Sweep thread exiting");
}

pub fn default_sweep_interval() -> Duration {
    if debugger_attached() {
        log::info!("Debugger attached, using {:?} sweep interval", DEBUG_SWEEP_INTERVAL);
        DEBUG_SWEEP_INTERVAL
    } else {
        DEFAULT_SWEEP_INTERVAL
    }
}

/// Whether a tracer is attached to this process
#[cfg(target_os = "linux")]
pub fn debugger_attached() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .map(|status| tracer_pid(&status).is_some_and(|pid| pid != 0))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
pub fn debugger_attached() -> bool {
    false
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}
