//! Badge response dumper
//!
//! Opens a badge, polls every readable setting once a second and prints
//! each decoded response, for protocol debugging.
//!
//! Usage: `cargo run --example response_dump -- /dev/ttyUSB0 115200`

use badge_io::protocol::SettingId;
use badge_io::{BadgeLink, CallbackHandler, Command, LinkOptions, Response};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud: u32 = match args.next() {
        Some(baud) => baud.parse()?,
        None => 115_200,
    };

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let handler = CallbackHandler::new(move |response: &Response| {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut bytes = Vec::new();
        response.encode(&mut bytes);
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        println!("[{:04}] {:<24} {:?}", n, hex.join(" "), response);
    })
    .with_failure(|payload| println!("  --> gave up on {} byte packet", payload.len()));

    log::info!("Opening {} at {} baud...", port, baud);
    let link = BadgeLink::open(&port, baud, LinkOptions::default(), Arc::new(handler))?;

    match link.wait_for_caps(Duration::from_secs(2)) {
        Some(caps) => log::info!(
            "Badge {}x{} {}bpp, protocol v{}",
            caps.width,
            caps.height,
            caps.bits_per_pixel,
            caps.version
        ),
        None => log::warn!("No caps response within 2s"),
    }

    let queries = [
        SettingId::Brightness,
        SettingId::HoldTimings,
        SettingId::IdleTimeout,
        SettingId::FadeValue,
        SettingId::AnimBookmarkPos,
        SettingId::AnimReadPos,
        SettingId::AnimPlayState,
        SettingId::ButtonState,
        SettingId::BufferFullness,
    ];

    let start = Instant::now();
    let mut cookie = 0u8;
    while start.elapsed() < Duration::from_secs(10) {
        let mut batch = Vec::new();
        cookie = (cookie + 1) & 0x0F;
        Command::Ping { cookie }.encode(&mut batch);
        for id in queries {
            Command::QuerySetting(id).encode(&mut batch);
        }
        link.send(&batch, true)?;
        std::thread::sleep(Duration::from_secs(1));
    }

    link.close()?;
    log::info!(
        "Received {} responses, {} packets unacknowledged",
        received.load(Ordering::Relaxed),
        link.pending_count()
    );
    Ok(())
}
