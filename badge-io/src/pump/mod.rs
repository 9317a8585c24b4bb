//! Real-time frame pump
//!
//! A dedicated thread that, once per frame period, renders through the
//! caller's [`FrameHooks`], packs the result and sends it to the badge.
//! Commands queued with [`FramePump::enqueue_commands`] go out ahead of the
//! next frame.
//!
//! ```text
//!            start()              dispose() / drop
//! Disabled ───────────▶ Running ──────────────────▶ Terminated
//!     ▲                    │
//!     └────── stop() ──────┘
//! ```
//!
//! The pump outlives connections: frames built while no link is attached
//! are dropped, along with any queued commands.

mod frame;
mod timing;

pub use frame::FrameHooks;
pub use timing::{frame_budget, frame_period};

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use self::frame::FrameBuilder;
use self::timing::wait_until;
use crate::config::ConnectionConfig;
use crate::dispatch::ResponseHandler;
use crate::error::{Error, Result};
use crate::link::BadgeLink;
use crate::protocol::DeviceCaps;
use crate::transport::{MockTransport, SimulatedBadge};

/// Per-frame knobs, read once at the start of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpSettings {
    /// Frames per second
    pub frame_rate: u32,
    /// Sent as a Brightness setting whenever it changes
    pub brightness: u8,
    /// Error-diffuse the gray buffer before packing
    pub dither: bool,
    /// Rotate the frame 180 degrees
    pub rotate: bool,
    /// Stretch overrun frames to whole periods
    pub frame_sync: bool,
    /// Spin through the last millisecond of each frame
    pub strict_timing: bool,
    /// Render through the frame buffer; otherwise ask for raw commands
    pub use_frame_buffer: bool,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            brightness: 255,
            dither: false,
            rotate: false,
            frame_sync: false,
            strict_timing: false,
            use_frame_buffer: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Disabled,
    Running,
    Terminated,
}

#[derive(Debug, Default)]
struct Gate {
    enabled: bool,
    cancelled: bool,
}

/// State shared with the pump thread
struct Shared {
    gate: Mutex<Gate>,
    wakeup: Condvar,
    settings: RwLock<PumpSettings>,
    link: RwLock<Option<Arc<BadgeLink>>>,
    queue: SegQueue<(Vec<u8>, bool)>,
    /// Set on every new connection
    resend_brightness: AtomicBool,
    frames_sent: AtomicU64,
}

impl Shared {
    /// Block until enabled; false once cancelled
    fn wait_for_gate(&self) -> bool {
        let mut gate = self.gate.lock();
        while !gate.cancelled && !gate.enabled {
            self.wakeup.wait(&mut gate);
        }
        !gate.cancelled
    }

    fn send_frame(&self, link: Option<&BadgeLink>, batch: &[u8]) {
        let Some(link) = link.filter(|l| !l.is_closed()) else {
            let mut dropped = 0;
            while self.queue.pop().is_some() {
                dropped += 1;
            }
            if dropped > 0 {
                log::debug!("Not connected, dropped {} queued batches", dropped);
            }
            return;
        };

        while let Some((commands, ensure_delivery)) = self.queue.pop() {
            if commands.is_empty() {
                continue;
            }
            if let Err(e) = link.send(&commands, ensure_delivery) {
                log::warn!("Queued command send failed: {}", e);
            }
        }

        if batch.is_empty() {
            return;
        }
        match link.send(batch, false) {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("Frame send failed: {}", e),
        }
    }
}

/// Owns the pump thread
pub struct FramePump {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl FramePump {
    /// Spawn the pump thread in the Disabled state
    pub fn new(settings: PumpSettings, hooks: FrameHooks) -> Result<Self> {
        let shared = Arc::new(Shared {
            gate: Mutex::new(Gate::default()),
            wakeup: Condvar::new(),
            settings: RwLock::new(settings),
            link: RwLock::new(None),
            queue: SegQueue::new(),
            resend_brightness: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("badge-pump".to_string())
            .spawn(move || pump_loop(thread_shared, hooks))
            .map_err(|e| Error::Other(format!("Failed to spawn pump thread: {}", e)))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> PumpState {
        let gate = self.shared.gate.lock();
        if gate.cancelled {
            PumpState::Terminated
        } else if gate.enabled {
            PumpState::Running
        } else {
            PumpState::Disabled
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PumpState::Running
    }

    /// Let frames through the gate
    pub fn start(&self) -> Result<()> {
        let mut gate = self.shared.gate.lock();
        if gate.cancelled {
            return Err(Error::PumpTerminated);
        }
        if !gate.enabled {
            gate.enabled = true;
            self.shared.wakeup.notify_all();
            log::info!("Frame pump started");
        }
        Ok(())
    }

    /// Close the gate; the frame in progress still completes
    pub fn stop(&self) -> Result<()> {
        let mut gate = self.shared.gate.lock();
        if gate.cancelled {
            return Err(Error::PumpTerminated);
        }
        if gate.enabled {
            gate.enabled = false;
            log::info!("Frame pump stopped");
        }
        Ok(())
    }

    /// Stop the thread for good and join it
    pub fn dispose(&mut self) -> Result<()> {
        {
            let mut gate = self.shared.gate.lock();
            gate.cancelled = true;
            self.shared.wakeup.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
            log::info!("Frame pump terminated");
        }
        Ok(())
    }

    pub fn settings(&self) -> PumpSettings {
        *self.shared.settings.read()
    }

    pub fn set_settings(&self, settings: PumpSettings) {
        *self.shared.settings.write() = settings;
    }

    /// Change settings in place; takes effect from the next frame
    pub fn update_settings(&self, f: impl FnOnce(&mut PumpSettings)) {
        f(&mut self.shared.settings.write());
    }

    /// Open a link as described by `config` and attach it
    ///
    /// With `config.simulate` the link talks to an in-process badge built from
    /// the configured preset instead of a serial port.
    pub fn connect(
        &self,
        config: &ConnectionConfig,
        handler: Arc<dyn ResponseHandler>,
    ) -> Result<Arc<BadgeLink>> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        let link = if config.simulate {
            let device = SimulatedBadge::from_preset(config.device);
            BadgeLink::open_with_transport(
                Box::new(MockTransport::with_device(device)),
                config.baud(),
                config.link_options(),
                handler,
            )?
        } else {
            BadgeLink::open(&config.port, config.baud(), config.link_options(), handler)?
        };
        let link = Arc::new(link);
        self.attach(Arc::clone(&link))?;
        Ok(link)
    }

    /// Install an already opened link
    pub fn attach(&self, link: Arc<BadgeLink>) -> Result<()> {
        let mut current = self.shared.link.write();
        if current.as_ref().is_some_and(|l| !l.is_closed()) {
            return Err(Error::AlreadyConnected);
        }
        *current = Some(link);
        self.shared.resend_brightness.store(true, Ordering::Relaxed);
        log::info!("Frame pump connected");
        Ok(())
    }

    /// Detach and close the current link
    pub fn disconnect(&self) -> Result<()> {
        let link = self.shared.link.write().take();
        match link {
            Some(link) => {
                log::info!("Frame pump disconnected");
                link.close()
            }
            None => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .link
            .read()
            .as_ref()
            .is_some_and(|l| !l.is_closed())
    }

    pub fn link(&self) -> Option<Arc<BadgeLink>> {
        self.shared.link.read().clone()
    }

    /// Geometry of the connected badge, once known
    pub fn caps(&self) -> Option<DeviceCaps> {
        self.shared.link.read().as_ref().and_then(|l| l.caps())
    }

    /// Queue a command batch for the start of the next frame
    ///
    /// Never blocks. Batches are dropped if no link is attached by then.
    pub fn enqueue_commands(&self, commands: Vec<u8>, ensure_delivery: bool) {
        self.shared.queue.push((commands, ensure_delivery));
    }

    /// Frame batches handed to the link so far
    pub fn frames_sent(&self) -> u64 {
        self.shared.frames_sent.load(Ordering::Relaxed)
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

fn pump_loop(shared: Arc<Shared>, mut hooks: FrameHooks) {
    let mut builder = FrameBuilder::new();

    while shared.wait_for_gate() {
        let started = Instant::now();
        let settings = *shared.settings.read();

        if shared.resend_brightness.swap(false, Ordering::Relaxed) {
            builder.forget_brightness();
        }
        let link = shared.link.read().clone();
        let caps = link.as_ref().and_then(|l| l.caps());

        let batch = builder.build(&settings, caps.as_ref(), &mut hooks);
        shared.send_frame(link.as_deref(), &batch);
        log::trace!("Frame built: {} bytes", batch.len());

        let period = frame_period(settings.frame_rate);
        let budget = frame_budget(started.elapsed(), period, settings.frame_sync);
        wait_until(started + budget, settings.strict_timing);
    }

    log::debug!("Pump thread exiting");
}
