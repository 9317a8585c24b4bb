//! Reliable packet link to a badge
//!
//! A [`BadgeLink`] frames command batches into checksummed packets, tracks
//! packets that asked for an acknowledgment, and retries them until the badge
//! confirms or the attempt budget runs out.
//!
//! # Threads
//!
//! | Thread        | Job                                                  |
//! |---------------|------------------------------------------------------|
//! | `badge-reader`| Short reads, response decode, ack/error bookkeeping  |
//! | `badge-sweep` | Expire unacknowledged packets and resend them        |
//!
//! Callers send from their own thread. Responses reach the
//! [`ResponseHandler`] on the reader thread, permanent failures on the sweep
//! thread.
//!
//! # Open sequence
//!
//! 1. Port configured 8N1 at the requested baud, no flow control
//! 2. Id pool reset, reader and sweep threads started
//! 3. 256 bytes of 0xFF flush any half-received packet on the badge
//! 4. Reliable Caps query, so geometry is known before frame data

pub mod frame;
mod packet_ids;
mod pending;
mod reader;
mod receive;
mod ring_buffer;
mod state;
mod sweep;

pub use packet_ids::MAX_IN_FLIGHT;
pub use pending::MAX_ATTEMPTS;
pub use sweep::{
    debugger_attached, default_sweep_interval, DEBUG_SWEEP_INTERVAL, DEFAULT_SWEEP_INTERVAL,
};

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use self::state::LinkCore;
use crate::dispatch::ResponseHandler;
use crate::error::{Error, Result};
use crate::protocol::{Command, DeviceCaps, SettingId};
use crate::transport::{SerialTransport, Transport};

/// Tuning knobs for [`BadgeLink::open`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    /// Retry timeout and sweep period; None picks one based on debugger presence
    pub sweep_interval: Option<Duration>,
}

/// An open connection to a badge
pub struct BadgeLink {
    core: Arc<LinkCore>,
    closed: AtomicBool,
    reader_shutdown: Arc<AtomicBool>,
    sweep_stop: Mutex<Option<Sender<()>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BadgeLink {
    /// Open a serial port and run the connect handshake
    pub fn open(
        port: &str,
        baud: u32,
        options: LinkOptions,
        handler: Arc<dyn ResponseHandler>,
    ) -> Result<Self> {
        let transport = SerialTransport::open(port, baud)?;
        Self::open_with_transport(Box::new(transport), baud, options, handler)
    }

    /// Run the connect handshake over an already opened transport
    ///
    /// `baud` is recorded in the device caps; the transport is expected to
    /// already run at that rate.
    pub fn open_with_transport(
        transport: Box<dyn Transport>,
        baud: u32,
        options: LinkOptions,
        handler: Arc<dyn ResponseHandler>,
    ) -> Result<Self> {
        let interval = options.sweep_interval.unwrap_or_else(default_sweep_interval);
        let core = Arc::new(LinkCore::new(transport, baud, interval, handler));
        core.reset();

        let link = Self {
            core,
            closed: AtomicBool::new(false),
            reader_shutdown: Arc::new(AtomicBool::new(false)),
            sweep_stop: Mutex::new(None),
            reader_handle: Mutex::new(None),
            sweep_handle: Mutex::new(None),
        };
        // On any failure below, dropping `link` stops whatever already started
        link.start()?;

        link.core.write_sync_run()?;
        let mut query = Vec::with_capacity(2);
        Command::QuerySetting(SettingId::Caps).encode(&mut query);
        link.core.send(&query, true)?;

        log::info!(
            "Badge link open at {} baud, sweep every {:?}",
            baud,
            interval
        );
        Ok(link)
    }

    fn start(&self) -> Result<()> {
        let reader_core = Arc::clone(&self.core);
        let reader_shutdown = Arc::clone(&self.reader_shutdown);
        *self.reader_handle.lock() = Some(
            thread::Builder::new()
                .name("badge-reader".to_string())
                .spawn(move || reader::reader_loop(reader_core, reader_shutdown))
                .map_err(|e| Error::Other(format!("Failed to spawn reader thread: {}", e)))?,
        );

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let sweep_core = Arc::clone(&self.core);
        *self.sweep_handle.lock() = Some(
            thread::Builder::new()
                .name("badge-sweep".to_string())
                .spawn(move || sweep::sweep_loop(sweep_core, stop_rx))
                .map_err(|e| Error::Other(format!("Failed to spawn sweep thread: {}", e)))?,
        );
        *self.sweep_stop.lock() = Some(stop_tx);
        Ok(())
    }

    /// Send a command batch
    ///
    /// With `ensure_delivery` every packet asks for an acknowledgment and is
    /// retried until acked or out of attempts. Batches longer than one
    /// packet are split on command boundaries.
    pub fn send(&self, payload: &[u8], ensure_delivery: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }
        self.core.send(payload, ensure_delivery)
    }

    /// Encode and send a single command
    pub fn send_command(&self, command: &Command, ensure_delivery: bool) -> Result<()> {
        let mut payload = Vec::with_capacity(command.encoded_len());
        command.encode(&mut payload);
        self.send(&payload, ensure_delivery)
    }

    /// Geometry reported by the badge, once its Caps response has arrived
    pub fn caps(&self) -> Option<DeviceCaps> {
        self.core.caps()
    }

    /// Block until the Caps response arrives or `timeout` passes
    pub fn wait_for_caps(&self, timeout: Duration) -> Option<DeviceCaps> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(caps) = self.core.caps() {
                return Some(caps);
            }
            if Instant::now() >= deadline || self.is_closed() {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn baud(&self) -> u32 {
        self.core.baud()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.core.sweep_interval()
    }

    /// Reliable packets waiting for an acknowledgment
    pub fn pending_count(&self) -> usize {
        self.core.pending_count()
    }

    /// Packets queued for the next resend flush
    pub fn resend_count(&self) -> usize {
        self.core.resend_count()
    }

    pub fn is_id_free(&self, id: u8) -> bool {
        self.core.is_id_free(id)
    }

    pub fn in_flight_ids(&self) -> Vec<u8> {
        self.core.in_flight_ids()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop both threads and release the port
    ///
    /// Later sends fail with [`Error::NotConnected`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::info!("Closing badge link...");

        self.reader_shutdown.store(true, Ordering::Relaxed);
        if let Some(stop) = self.sweep_stop.lock().take() {
            let _ = stop.send(());
        }

        let mut result = Ok(());
        if let Some(handle) = self.sweep_handle.lock().take() {
            if handle.join().is_err() {
                result = Err(Error::ThreadPanic);
            }
        }
        if let Some(handle) = self.reader_handle.lock().take() {
            if handle.join().is_err() {
                result = Err(Error::ThreadPanic);
            }
        }

        self.core.close_transport();
        log::info!(
            "Badge link closed ({} packets still unacknowledged)",
            self.core.pending_count()
        );
        result
    }
}

impl Drop for BadgeLink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
