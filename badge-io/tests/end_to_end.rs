//! Link and pump running against the mock transport and simulated badge

use badge_io::protocol::{
    AckSource, CapsReport, Command, DevicePreset, Response, SettingId, SettingReport,
    SettingUpdate,
};
use badge_io::transport::{MockTransport, SimulatedBadge};
use badge_io::{
    BadgeLink, CallbackHandler, FrameHooks, FramePump, LinkOptions, NullHandler, PumpSettings,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn encoded(responses: &[Response]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for response in responses {
        response.encode(&mut bytes);
    }
    bytes
}

fn ping(cookie: u8) -> Vec<u8> {
    let mut payload = Vec::new();
    Command::Ping { cookie }.encode(&mut payload);
    payload
}

fn open(mock: &MockTransport, sweep: Duration, handler: CallbackHandler) -> BadgeLink {
    BadgeLink::open_with_transport(
        Box::new(mock.clone()),
        115_200,
        LinkOptions {
            sweep_interval: Some(sweep),
        },
        Arc::new(handler),
    )
    .unwrap()
}

#[test]
fn test_handshake_then_reliable_ping() {
    let mock = MockTransport::new();
    let link = open(&mock, Duration::from_secs(5), CallbackHandler::new(|_| {}));

    let written = mock.get_written();
    assert!(written[..256].iter().all(|&b| b == 0xFF));
    assert_eq!(
        &written[256..],
        &[0xA5, 0x01, 0x02, 0xE4, 0xA4, 0x13, 0x19, 0x00]
    );

    // Badge answers the caps query and acks its packet
    mock.inject_read(&encoded(&[
        Response::Setting(SettingReport::Caps(CapsReport {
            version: 1,
            width: 48,
            height: 12,
            bits_per_pixel: 2,
            features: 1,
        })),
        Response::Ack {
            source: AckSource::PacketReceived,
            cookie: 1,
        },
    ]));
    assert!(wait_for(Duration::from_secs(2), || {
        link.caps().is_some() && link.pending_count() == 0
    }));
    let caps = link.caps().unwrap();
    assert_eq!((caps.width, caps.height, caps.bits_per_pixel), (48, 12, 2));
    assert_eq!(caps.baud, 115_200);

    mock.clear_written();
    link.send_command(&Command::Ping { cookie: 7 }, true).unwrap();
    assert_eq!(
        mock.get_written(),
        vec![0xA5, 0x01, 0x02, 0x98, 0x84, 0xAD, 0x07, 0x00]
    );
    assert_eq!(link.in_flight_ids(), vec![1]);

    mock.inject_read(&[0x00, 0x01]);
    assert!(wait_for(Duration::from_secs(2), || {
        link.pending_count() == 0 && link.is_id_free(1)
    }));
}

#[test]
fn test_unacknowledged_packet_fails_after_five_attempts() {
    let mut badge = SimulatedBadge::from_preset(DevicePreset::B1248);
    badge.faults_mut().mute_acks = true;
    let mock = MockTransport::with_device(badge);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let handler = CallbackHandler::new(|_| {}).with_failure(move |p| sink.lock().push(p.to_vec()));
    let link = open(&mock, Duration::from_millis(20), handler);

    link.send(&ping(3), true).unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        failures.lock().iter().any(|p| p == &ping(3))
    }));

    let attempts = mock
        .written_frames()
        .iter()
        .filter(|(header, payload)| header.cookie != 0 && payload == &ping(3))
        .count();
    assert_eq!(attempts, 5);
    assert_eq!(failures.lock().iter().filter(|p| *p == &ping(3)).count(), 1);
}

#[test]
fn test_overrun_resyncs_and_resends() {
    let mock = MockTransport::with_device(SimulatedBadge::from_preset(DevicePreset::B1248));
    let link = open(&mock, Duration::from_millis(20), CallbackHandler::new(|_| {}));
    assert!(link.wait_for_caps(Duration::from_secs(2)).is_some());
    assert!(wait_for(Duration::from_secs(2), || link.pending_count() == 0));

    mock.device(|d| d.faults_mut().overrun_packets = 1);
    mock.clear_written();
    link.send(&ping(5), true).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        link.pending_count() == 0 && link.resend_count() == 0
    }));
    assert_eq!(mock.device(|d| d.awaiting_sync()), Some(false));

    let written = mock.get_written();
    let frames = mock.written_frames();
    assert_eq!(frames.iter().filter(|(_, p)| p == &ping(5)).count(), 2);
    // Sync run went out between the two copies
    assert!(written.windows(256).any(|w| w.iter().all(|&b| b == 0xFF)));
}

#[test]
fn test_corrupt_packet_resent_once() {
    let mock = MockTransport::with_device(SimulatedBadge::from_preset(DevicePreset::B1236));
    let link = open(&mock, Duration::from_millis(20), CallbackHandler::new(|_| {}));
    assert!(wait_for(Duration::from_secs(2), || link.pending_count() == 0));

    mock.device(|d| d.faults_mut().corrupt_packets = 1);
    mock.clear_written();
    link.send(&ping(2), true).unwrap();

    assert!(wait_for(Duration::from_secs(2), || link.pending_count() == 0
        && link.resend_count() == 0));
    assert_eq!(
        mock.written_frames()
            .iter()
            .filter(|(_, p)| p == &ping(2))
            .count(),
        2
    );
}

#[test]
fn test_persistent_corruption_fails_after_five_attempts() {
    let mock = MockTransport::with_device(SimulatedBadge::from_preset(DevicePreset::B1248));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let handler = CallbackHandler::new(|_| {}).with_failure(move |p| sink.lock().push(p.to_vec()));
    let link = open(&mock, Duration::from_millis(20), handler);
    assert!(wait_for(Duration::from_secs(2), || link.pending_count() == 0));

    mock.device(|d| d.faults_mut().corrupt_packets = 10);
    mock.clear_written();
    link.send(&ping(6), true).unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        failures.lock().iter().any(|p| p == &ping(6))
    }));
    assert!(wait_for(Duration::from_secs(2), || link.pending_count() == 0
        && link.resend_count() == 0));
    assert_eq!(
        mock.written_frames()
            .iter()
            .filter(|(_, p)| p == &ping(6))
            .count(),
        5
    );
    assert_eq!(failures.lock().len(), 1);
    assert_eq!(mock.device(|d| d.faults_mut().corrupt_packets), Some(5));
}

#[test]
fn test_pump_drives_simulated_badge() {
    let mock = MockTransport::with_device(SimulatedBadge::from_preset(DevicePreset::B1248));
    let link = Arc::new(open(&mock, Duration::from_secs(5), CallbackHandler::new(|_| {})));
    assert!(link.wait_for_caps(Duration::from_secs(2)).is_some());

    let hooks = FrameHooks::new().on_render(|target| target.intermediate.fill(255));
    let settings = PumpSettings {
        brightness: 128,
        ..PumpSettings::default()
    };
    let mut pump = FramePump::new(settings, hooks).unwrap();
    pump.attach(Arc::clone(&link)).unwrap();
    pump.start().unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        mock.device(|d| d.swaps() >= 2).unwrap_or(false)
    }));
    mock.device(|d| {
        assert!(d.front_buffer().iter().all(|&b| b == 0xFF));
        assert_eq!(d.brightness(), 128);
    });

    // Out-of-band batch, reliably delivered ahead of a frame
    let mut batch = Vec::new();
    Command::UpdateSetting(SettingUpdate::HoldTimings { a: 3, b: 5, c: 7 }).encode(&mut batch);
    pump.enqueue_commands(batch, true);
    assert!(wait_for(Duration::from_secs(2), || {
        mock.device(|d| d.setting(SettingId::HoldTimings))
            == Some(Some(SettingUpdate::HoldTimings { a: 3, b: 5, c: 7 }))
    }));

    pump.update_settings(|s| s.brightness = 40);
    assert!(wait_for(Duration::from_secs(2), || {
        mock.device(|d| d.brightness()) == Some(40)
    }));

    pump.stop().unwrap();
    pump.dispose().unwrap();
    assert!(pump.start().is_err());
}

#[test]
fn test_pump_without_link_drops_queue() {
    let pump = FramePump::new(PumpSettings::default(), FrameHooks::new()).unwrap();
    pump.enqueue_commands(ping(1), true);
    pump.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pump.frames_sent(), 0);
    assert!(!pump.is_connected());

    let link = Arc::new(
        BadgeLink::open_with_transport(
            Box::new(MockTransport::with_device(SimulatedBadge::from_preset(
                DevicePreset::B1248,
            ))),
            115_200,
            LinkOptions::default(),
            Arc::new(NullHandler),
        )
        .unwrap(),
    );
    pump.attach(link).unwrap();
    assert!(wait_for(Duration::from_secs(2), || pump.frames_sent() > 0));
}
