//! badge-io - frame pump daemon for LED matrix badges
//!
//! Opens the configured badge (or a simulated one), then streams a moving
//! test pattern at the configured frame rate until Ctrl-C.

use badge_io::config::AppConfig;
use badge_io::error::{Error, Result};
use badge_io::protocol::{AckSource, ErrorCode, SettingReport};
use badge_io::{CallbackHandler, FrameHooks, FramePump, RenderTarget, Response};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Command line options
struct Args {
    config_path: Option<String>,
    simulate: bool,
}

/// Parse command line arguments.
///
/// Supports:
/// - `badge-io <path>` (positional)
/// - `badge-io --config <path>` / `-c <path>`
/// - `--simulate` to run against an in-process badge
///
/// Without a path, built-in defaults are used.
fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let simulate = args.iter().skip(1).any(|a| a == "--simulate");

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Args {
                config_path: Some(args[i + 1].clone()),
                simulate,
            };
        }
    }

    let config_path = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with('-'))
        .cloned();
    Args {
        config_path,
        simulate,
    }
}

/// Diagonal gray ramp scrolling one pixel per frame
fn test_pattern() -> impl FnMut(&mut RenderTarget) + Send {
    let mut offset = 0usize;
    move |target| {
        let (width, height) = (target.width(), target.height());
        for y in 0..height {
            for x in 0..width {
                let phase = (x + y + offset) % 16;
                target.set_pixel(x, y, (phase * 255 / 15) as u8);
            }
        }
        offset = offset.wrapping_add(1);
    }
}

fn log_response(response: &Response) {
    match response {
        Response::Ack {
            source: AckSource::PacketReceived,
            ..
        } => {}
        Response::Setting(SettingReport::ButtonState(buttons)) => {
            log::info!("Buttons: {:?}", buttons);
        }
        Response::Error {
            code: ErrorCode::BadSerialCommand | ErrorCode::BadAnimCommand,
            cookie,
        } => log::warn!("Badge rejected command (cookie {})", cookie),
        other => log::debug!("Response: {:?}", other),
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let mut config = match &args.config_path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if args.simulate {
        config.connection.simulate = true;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("badge-io v{} starting...", env!("CARGO_PKG_VERSION"));
    match &args.config_path {
        Some(path) => log::info!("Using config: {}", path),
        None => log::info!("No config given, using defaults"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let hooks = FrameHooks::new().on_render(test_pattern());
    let mut pump = FramePump::new(config.pump, hooks)?;

    let handler = CallbackHandler::new(log_response)
        .with_failure(|payload| log::error!("Badge never acknowledged {} bytes", payload.len()));

    let connection = &config.connection;
    if connection.simulate {
        log::info!("Simulating a {:?} badge", connection.device);
    } else {
        log::info!("Connecting to {} at {} baud", connection.port, connection.baud());
    }
    let link = pump.connect(connection, Arc::new(handler))?;

    match link.wait_for_caps(Duration::from_secs(2)) {
        Some(caps) => log::info!(
            "Badge {}x{} {}bpp (hardware brightness: {})",
            caps.width,
            caps.height,
            caps.bits_per_pixel,
            caps.has_hardware_brightness()
        ),
        None => log::warn!("No caps response yet, frames start once it arrives"),
    }

    pump.start()?;
    log::info!("Press Ctrl+C to stop");

    let mut last_stats = Instant::now();
    let mut last_frames = 0;
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= Duration::from_secs(10) {
            let frames = pump.frames_sent();
            let fps = (frames - last_frames) as f64 / last_stats.elapsed().as_secs_f64();
            log::info!(
                "Frames: {} ({:.1} fps), unacknowledged packets: {}",
                frames,
                fps,
                link.pending_count()
            );
            last_frames = frames;
            last_stats = Instant::now();
        }
    }

    log::info!("Shutting down...");
    drop(link);
    pump.dispose()?;
    pump.disconnect()?;
    log::info!("Shutdown complete");
    Ok(())
}
