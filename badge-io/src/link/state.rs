//! Link state shared by the caller, reader and sweep threads
//!
//! Every operation here is synchronous; the threads in `reader` and `sweep`
//! only decide when to call them. Lock order is send lock, then pending or
//! resend (briefly), then transport. The receive path never holds the send
//! lock while touching the pending list.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::frame::{encode_header, MAX_PAYLOAD, SYNC_RUN_LEN};
use super::packet_ids::PacketIdPool;
use super::pending::{PendingList, PendingPacket};
use super::receive::ResponseAssembler;
use crate::dispatch::ResponseHandler;
use crate::error::{Error, Result};
use crate::protocol::{split_batch, AckSource, DeviceCaps, Response, SettingReport};
use crate::transport::Transport;

pub(crate) struct LinkCore {
    /// Dropped on close; later sends fail with NotConnected
    transport: Mutex<Option<Box<dyn Transport>>>,
    /// Send lock: owns the id pool and serializes header + payload writes
    ids: Mutex<PacketIdPool>,
    pending: Mutex<PendingList>,
    resend: Mutex<VecDeque<PendingPacket>>,
    caps: RwLock<Option<DeviceCaps>>,
    assembler: Mutex<ResponseAssembler>,
    needs_resync: AtomicBool,
    handler: Arc<dyn ResponseHandler>,
    baud: u32,
    sweep_interval: Duration,
}

impl LinkCore {
    pub fn new(
        transport: Box<dyn Transport>,
        baud: u32,
        sweep_interval: Duration,
        handler: Arc<dyn ResponseHandler>,
    ) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            ids: Mutex::new(PacketIdPool::new()),
            pending: Mutex::new(PendingList::new()),
            resend: Mutex::new(VecDeque::new()),
            caps: RwLock::new(None),
            assembler: Mutex::new(ResponseAssembler::new()),
            needs_resync: AtomicBool::new(false),
            handler,
            baud,
            sweep_interval,
        }
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Forget all in-flight state and free every id
    pub fn reset(&self) {
        let mut ids = self.ids.lock();
        ids.reset();
        *self.pending.lock() = PendingList::new();
        self.resend.lock().clear();
        self.assembler.lock().clear();
        self.needs_resync.store(false, Ordering::Relaxed);
    }

    /// Write a run of 0xFF so the badge drops any half-parsed packet
    pub fn write_sync_run(&self) -> Result<()> {
        let _ids = self.ids.lock();
        self.write_sync_run_locked()
    }

    fn write_sync_run_locked(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        let transport = transport.as_mut().ok_or(Error::NotConnected)?;
        transport.write_all(&[0xFF; SYNC_RUN_LEN])?;
        transport.flush()?;
        log::debug!("Sync run written");
        Ok(())
    }

    /// Send a command batch, split into packets on command boundaries
    pub fn send(&self, payload: &[u8], ensure_delivery: bool) -> Result<()> {
        self.flush_resends();
        for chunk in split_batch(payload, MAX_PAYLOAD)? {
            self.send_packet(chunk, ensure_delivery, 1)?;
        }
        Ok(())
    }

    /// Frame and write one packet
    fn send_packet(&self, payload: &[u8], ensure_delivery: bool, attempt: u32) -> Result<()> {
        let mut ids = self.ids.lock();

        if self.needs_resync.swap(false, Ordering::Relaxed) {
            log::warn!("Resynchronizing badge before send");
            if let Err(e) = self.write_sync_run_locked() {
                self.needs_resync.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }

        let cookie = if ensure_delivery {
            let cookie = ids.allocate().ok_or(Error::PacketIdsExhausted)?;
            self.pending.lock().push(PendingPacket {
                cookie,
                attempt,
                sent_at: Instant::now(),
                payload: payload.to_vec(),
            });
            cookie
        } else {
            0
        };

        if let Err(e) = self.write_packet(cookie, payload) {
            // Untrack it; the caller or the resend list still owns the payload
            if cookie != 0 {
                self.pending.lock().remove(cookie);
                ids.release(cookie);
            }
            return Err(e);
        }
        log::debug!(
            "Sent packet cookie={} len={} attempt={}",
            cookie,
            payload.len(),
            attempt
        );
        Ok(())
    }

    /// Header + payload under the transport lock
    fn write_packet(&self, cookie: u8, payload: &[u8]) -> Result<()> {
        let header = encode_header(cookie, payload)?;
        let mut transport = self.transport.lock();
        let transport = transport.as_mut().ok_or(Error::NotConnected)?;
        transport.write_all(&header)?;
        transport.write_all(payload)?;
        transport.flush()
    }

    /// Queue a retired packet for resend, or report it once out of attempts
    fn requeue(&self, packet: PendingPacket) {
        if packet.is_exhausted() {
            log::error!(
                "Packet cookie {} failed after {} attempts, giving up",
                packet.cookie,
                packet.attempt
            );
            self.handler.on_send_failure(&packet.payload);
        } else {
            self.resend.lock().push_back(packet);
        }
    }

    /// Resend everything queued for retry
    ///
    /// Resends always request an ack and never trigger another flush.
    pub fn flush_resends(&self) {
        let queued: Vec<PendingPacket> = self.resend.lock().drain(..).collect();
        let mut queued = queued.into_iter();
        while let Some(packet) = queued.next() {
            log::warn!(
                "Resending packet (was cookie {}, attempt {})",
                packet.cookie,
                packet.attempt + 1
            );
            if let Err(e) = self.send_packet(&packet.payload, true, packet.attempt + 1) {
                log::error!("Resend failed: {}", e);
                // Keep the rest for the next sweep
                let mut resend = self.resend.lock();
                resend.push_back(packet);
                resend.extend(queued);
                break;
            }
        }
    }

    /// Expire overdue packets as of `now`, then flush resends
    pub fn sweep_at(&self, now: Instant) {
        loop {
            let expired = self.pending.lock().pop_expired(now, self.sweep_interval);
            let Some(packet) = expired else {
                break;
            };
            self.ids.lock().release(packet.cookie);
            log::debug!("Packet cookie {} timed out", packet.cookie);
            self.requeue(packet);
        }
        self.flush_resends();
    }

    /// Feed bytes read from the transport
    pub fn receive(&self, bytes: &[u8]) {
        let responses: Vec<Response> = {
            let mut assembler = self.assembler.lock();
            assembler.push(bytes);
            std::iter::from_fn(|| assembler.next_response()).collect()
        };

        for response in responses {
            self.apply(&response);
            self.handler.on_response(&response);
        }
    }

    /// Link bookkeeping for a response before it is handed on
    fn apply(&self, response: &Response) {
        match response {
            Response::Ack {
                source: AckSource::PacketReceived,
                cookie,
            } => {
                if self.retire(*cookie).is_none() {
                    log::debug!("Ack for unknown cookie {}", cookie);
                }
            }
            Response::Error { code, cookie } => {
                log::warn!("Badge reported {:?} for cookie {}", code, cookie);
                if code.is_transient() {
                    if let Some(packet) = self.retire(*cookie) {
                        self.requeue(packet);
                    }
                }
                if code.needs_resync() {
                    self.needs_resync.store(true, Ordering::Relaxed);
                }
            }
            Response::Setting(SettingReport::Caps(report)) => {
                let caps = DeviceCaps::from_report(report, self.baud);
                log::info!(
                    "Badge caps: v{} {}x{} {}bpp features={:#04x}",
                    caps.version,
                    caps.width,
                    caps.height,
                    caps.bits_per_pixel,
                    caps.features.0
                );
                *self.caps.write() = Some(caps);
            }
            _ => {}
        }
    }

    /// Take a packet out of the pending list and free its id
    fn retire(&self, cookie: u8) -> Option<PendingPacket> {
        if cookie == 0 {
            return None;
        }
        let packet = self.pending.lock().remove(cookie)?;
        self.ids.lock().release(cookie);
        Some(packet)
    }

    /// Read from the transport without blocking other users for long
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut transport = self.transport.lock();
        transport.as_mut().ok_or(Error::NotConnected)?.read(buffer)
    }

    /// Drop the transport; the port closes with it
    pub fn close_transport(&self) {
        let _ids = self.ids.lock();
        self.transport.lock().take();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.lock().is_some()
    }

    pub fn caps(&self) -> Option<DeviceCaps> {
        *self.caps.read()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn resend_count(&self) -> usize {
        self.resend.lock().len()
    }

    pub fn is_id_free(&self, id: u8) -> bool {
        self.ids.lock().is_free(id)
    }

    pub fn in_flight_ids(&self) -> Vec<u8> {
        self.ids.lock().in_flight_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CallbackHandler;
    use crate::link::frame::HEADER_LEN;
    use crate::protocol::{CapsReport, Command, ErrorCode, SettingId};
    use crate::transport::MockTransport;

    const INTERVAL: Duration = Duration::from_millis(500);

    struct Fixture {
        core: LinkCore,
        mock: MockTransport,
        responses: Arc<Mutex<Vec<Response>>>,
        failures: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    fn fixture() -> Fixture {
        let mock = MockTransport::new();
        let responses = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let responses = Arc::clone(&responses);
            let failures = Arc::clone(&failures);
            CallbackHandler::new(move |r| responses.lock().push(r.clone()))
                .with_failure(move |p| failures.lock().push(p.to_vec()))
        };
        let core = LinkCore::new(Box::new(mock.clone()), 115_200, INTERVAL, Arc::new(handler));
        Fixture {
            core,
            mock,
            responses,
            failures,
        }
    }

    /// Port that fails every write, as after the cable is pulled
    struct UnpluggedTransport;

    impl Transport for UnpluggedTransport {
        fn read(&mut self, _buffer: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn write(&mut self, _data: &[u8]) -> Result<usize> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )))
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn unplugged() -> LinkCore {
        let handler = CallbackHandler::new(|_| {});
        LinkCore::new(Box::new(UnpluggedTransport), 115_200, INTERVAL, Arc::new(handler))
    }

    fn ping(cookie: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        Command::Ping { cookie }.encode(&mut payload);
        payload
    }

    fn encoded(response: &Response) -> Vec<u8> {
        let mut bytes = Vec::new();
        response.encode(&mut bytes);
        bytes
    }

    #[test]
    fn test_reliable_send_frames_and_tracks() {
        let f = fixture();
        f.core.send(&ping(7), true).unwrap();
        assert_eq!(
            f.mock.get_written(),
            vec![0xA5, 0x01, 0x02, 0x98, 0x84, 0xAD, 0x07, 0x00]
        );
        assert_eq!(f.core.pending_count(), 1);
        assert_eq!(f.core.in_flight_ids(), vec![1]);

        f.core.receive(&encoded(&Response::Ack {
            source: AckSource::PacketReceived,
            cookie: 1,
        }));
        assert_eq!(f.core.pending_count(), 0);
        assert!(f.core.is_id_free(1));
        assert_eq!(f.responses.lock().len(), 1);
    }

    #[test]
    fn test_unreliable_send_uses_cookie_zero() {
        let f = fixture();
        f.core.send(&ping(1), false).unwrap();
        let frames = f.mock.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.cookie, 0);
        assert_eq!(f.core.pending_count(), 0);
    }

    #[test]
    fn test_ping_ack_does_not_retire() {
        let f = fixture();
        f.core.send(&ping(1), true).unwrap();
        f.core.receive(&encoded(&Response::Ack {
            source: AckSource::Ping,
            cookie: 1,
        }));
        assert_eq!(f.core.pending_count(), 1);
    }

    #[test]
    fn test_timeout_retries_then_fails_once() {
        let f = fixture();
        f.core.send(&ping(3), true).unwrap();

        for _ in 0..10 {
            f.core.sweep_at(Instant::now() + INTERVAL * 2);
        }

        let frames = f.mock.written_frames();
        assert_eq!(frames.len(), 5, "one send plus four resends");
        assert!(frames.iter().all(|(h, p)| h.cookie != 0 && p == &ping(3)));
        assert_eq!(*f.failures.lock(), vec![ping(3)]);
        assert_eq!(f.core.pending_count(), 0);
        assert_eq!(f.core.resend_count(), 0);
        assert!(f.core.in_flight_ids().is_empty());
    }

    #[test]
    fn test_sweep_leaves_fresh_packets() {
        let f = fixture();
        f.core.send(&ping(3), true).unwrap();
        f.core.sweep_at(Instant::now());
        assert_eq!(f.mock.written_frames().len(), 1);
        assert_eq!(f.core.pending_count(), 1);
    }

    #[test]
    fn test_corrupt_data_error_resends_once() {
        let f = fixture();
        f.core.send(&ping(2), true).unwrap();
        f.mock.clear_written();

        f.core.receive(&encoded(&Response::Error {
            code: ErrorCode::CorruptPacketData,
            cookie: 1,
        }));
        assert_eq!(f.core.pending_count(), 0);
        assert_eq!(f.core.resend_count(), 1);

        // Next sweep flushes the resend without expiring anything
        f.core.sweep_at(Instant::now());
        f.core.sweep_at(Instant::now());
        let frames = f.mock.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].1, ping(2));
        assert_eq!(f.core.pending_count(), 1);
        // Error forwarded to the handler as well
        assert_eq!(f.responses.lock().len(), 1);
    }

    #[test]
    fn test_device_errors_bounded_by_attempt_limit() {
        let f = fixture();
        f.core.send(&ping(2), true).unwrap();

        for _ in 0..20 {
            if let Some(&cookie) = f.core.in_flight_ids().first() {
                f.core.receive(&encoded(&Response::Error {
                    code: ErrorCode::CorruptPacketData,
                    cookie,
                }));
            }
            f.core.sweep_at(Instant::now());
        }

        let frames = f.mock.written_frames();
        assert_eq!(frames.iter().filter(|(_, p)| p == &ping(2)).count(), 5);
        assert_eq!(*f.failures.lock(), vec![ping(2)]);
        assert_eq!(f.core.pending_count(), 0);
        assert_eq!(f.core.resend_count(), 0);
        assert!(f.core.in_flight_ids().is_empty());
    }

    #[test]
    fn test_failed_write_releases_packet() {
        let core = unplugged();
        assert!(matches!(core.send(&ping(1), true), Err(Error::Io(_))));
        assert_eq!(core.pending_count(), 0);
        assert!(core.is_id_free(1));
        assert!(core.in_flight_ids().is_empty());

        // Retrying after a failure does not leave a duplicate behind
        assert!(core.send(&ping(1), true).is_err());
        assert_eq!(core.pending_count(), 0);
    }

    #[test]
    fn test_failed_resend_tracked_once() {
        let core = unplugged();
        core.resend.lock().push_back(PendingPacket {
            cookie: 1,
            attempt: 2,
            sent_at: Instant::now(),
            payload: ping(4),
        });

        for _ in 0..3 {
            core.flush_resends();
            assert_eq!(core.pending_count() + core.resend_count(), 1);
            assert_eq!(core.resend_count(), 1);
            assert!(core.in_flight_ids().is_empty());
        }
        assert_eq!(core.resend.lock()[0].attempt, 2);
    }

    #[test]
    fn test_error_for_unknown_cookie_ignored() {
        let f = fixture();
        f.core.receive(&encoded(&Response::Error {
            code: ErrorCode::CorruptPacketData,
            cookie: 42,
        }));
        assert_eq!(f.core.resend_count(), 0);
    }

    #[test]
    fn test_bad_command_triggers_resync_run() {
        let f = fixture();
        f.core.receive(&encoded(&Response::Error {
            code: ErrorCode::BadSerialCommand,
            cookie: 0,
        }));
        f.core.send(&ping(1), false).unwrap();
        let written = f.mock.get_written();
        assert_eq!(written.len(), SYNC_RUN_LEN + HEADER_LEN + 2);
        assert!(written[..SYNC_RUN_LEN].iter().all(|&b| b == 0xFF));

        // Only once
        f.mock.clear_written();
        f.core.send(&ping(1), false).unwrap();
        assert_eq!(f.mock.get_written().len(), HEADER_LEN + 2);
    }

    #[test]
    fn test_caps_response_populates_caps() {
        let f = fixture();
        assert!(f.core.caps().is_none());
        f.core.receive(&encoded(&Response::Setting(SettingReport::Caps(CapsReport {
            version: 1,
            width: 36,
            height: 12,
            bits_per_pixel: 2,
            features: 0,
        }))));
        let caps = f.core.caps().unwrap();
        assert_eq!(caps.width, 36);
        assert_eq!(caps.baud, 115_200);
    }

    #[test]
    fn test_large_batch_split_into_packets() {
        let f = fixture();
        let mut batch = Vec::new();
        for _ in 0..200 {
            Command::QuerySetting(SettingId::Brightness).encode(&mut batch);
        }
        f.core.send(&batch, true).unwrap();
        let frames = f.mock.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0.cookie, 1);
        assert_eq!(frames[1].0.cookie, 2);
        assert_eq!(f.core.pending_count(), 2);
    }

    #[test]
    fn test_id_exhaustion() {
        let f = fixture();
        for _ in 0..255 {
            f.core.send(&ping(0), true).unwrap();
        }
        assert!(matches!(
            f.core.send(&ping(0), true),
            Err(Error::PacketIdsExhausted)
        ));
        assert_eq!(f.core.pending_count(), 255);
    }

    #[test]
    fn test_send_after_close() {
        let f = fixture();
        f.core.close_transport();
        assert!(!f.core.is_connected());
        assert!(matches!(
            f.core.send(&ping(0), false),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_response_split_across_reads() {
        let f = fixture();
        let ack = encoded(&Response::Ack {
            source: AckSource::Ping,
            cookie: 9,
        });
        f.core.receive(&ack[..1]);
        assert!(f.responses.lock().iter().all(|r| !matches!(r, Response::Ack { cookie: 9, .. })));
        f.core.receive(&ack[1..]);
        assert!(f.responses.lock().iter().any(|r| matches!(r, Response::Ack { cookie: 9, .. })));
    }
}
