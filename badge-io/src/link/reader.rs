//! Reader thread
//!
//! Holds the transport lock only for one short read, so senders are never
//! stuck behind a slow response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::state::LinkCore;

const READ_CHUNK: usize = 512;

pub(super) fn reader_loop(core: Arc<LinkCore>, shutdown: Arc<AtomicBool>) {
    let mut buffer = [0u8; READ_CHUNK];

    while !shutdown.load(Ordering::Relaxed) {
        match core.read(&mut buffer) {
            Ok(0) => thread::sleep(Duration::from_millis(2)),
            Ok(n) => {
                log::trace!("Read {} bytes", n);
                core.receive(&buffer[..n]);
            }
            Err(e) => {
                log::error!("Serial read error: {}", e);
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    log::info!("Reader thread exiting");
}
