//! In-process badge model
//!
//! Behaves like badge firmware on the far side of a [`MockTransport`]:
//! parses framed packets, checks both checksums, acknowledges reliable
//! packets and executes the commands inside them against a front and back
//! pixel buffer, a settings table and a small EEPROM.
//!
//! # Error behavior
//!
//! | Condition                  | Reply                                | Afterwards            |
//! |----------------------------|--------------------------------------|-----------------------|
//! | header crc8 mismatch       | Error(CorruptPacketHeader, 0)        | resume at next byte   |
//! | payload crc16 mismatch     | Error(CorruptPacketData, cookie)     | packet dropped        |
//! | undecodable command        | Error(BadSerialCommand, cookie)      | wait for 0xFF run     |
//! | injected overrun           | Error(ReceiveBufferOverrun, cookie)  | wait for 0xFF run     |
//! | EEPROM access out of range | Error(EepromWriteOutOfBounds, cookie)| command skipped       |
//!
//! [`MockTransport`]: super::MockTransport

use crate::link::frame::{FrameHeader, HEADER_LEN, SYNC_BYTE, SYNC_RUN_LEN};
use crate::protocol::{
    AckSource, AnimState, ButtonState, Command, DeviceCaps, DevicePreset, EndOfFadeAction,
    ErrorCode, FadingAction, PixelFormat, Response, SettingId, SettingReport, SettingUpdate,
    Target,
};

/// EEPROM size in bytes
pub const EEPROM_SIZE: usize = 1024;

/// Faults applied to upcoming packets, in the order drop, corrupt, overrun
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultConfig {
    /// Swallow this many packets without any reply
    pub drop_packets: u32,
    /// Report this many packets as CorruptPacketData
    pub corrupt_packets: u32,
    /// Report this many packets as ReceiveBufferOverrun
    pub overrun_packets: u32,
    /// Never send Ack(PacketReceived)
    pub mute_acks: bool,
}

/// Simulated badge device
pub struct SimulatedBadge {
    caps: DeviceCaps,
    rx: Vec<u8>,
    awaiting_sync: bool,
    sync_count: usize,
    faults: FaultConfig,
    front: Vec<u8>,
    back: Vec<u8>,
    settings: [SettingUpdate; 7],
    buttons: ButtonState,
    eeprom: Vec<u8>,
    packets_received: u64,
    swaps: u64,
}

impl SimulatedBadge {
    pub fn new(caps: DeviceCaps) -> Self {
        let frame_size = caps.frame_size();
        Self {
            caps,
            rx: Vec::new(),
            awaiting_sync: false,
            sync_count: 0,
            faults: FaultConfig::default(),
            front: vec![0; frame_size],
            back: vec![0; frame_size],
            settings: [
                SettingUpdate::Brightness(255),
                SettingUpdate::HoldTimings { a: 1, b: 2, c: 4 },
                SettingUpdate::IdleTimeout {
                    timeout: 255,
                    fade: false,
                    end_of_fade: EndOfFadeAction::None,
                },
                SettingUpdate::FadeValue {
                    value: 255,
                    action: FadingAction::None,
                },
                SettingUpdate::AnimBookmarkPos(0),
                SettingUpdate::AnimReadPos(0),
                SettingUpdate::AnimPlayState(AnimState::Stopped),
            ],
            buttons: ButtonState::default(),
            eeprom: vec![0xFF; EEPROM_SIZE],
            packets_received: 0,
            swaps: 0,
        }
    }

    pub fn from_preset(preset: DevicePreset) -> Self {
        Self::new(preset.caps())
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn faults_mut(&mut self) -> &mut FaultConfig {
        &mut self.faults
    }

    pub fn set_buttons(&mut self, buttons: ButtonState) {
        self.buttons = buttons;
    }

    /// Packed contents currently shown
    pub fn front_buffer(&self) -> &[u8] {
        &self.front
    }

    pub fn back_buffer(&self) -> &[u8] {
        &self.back
    }

    /// Current value of a writable setting
    pub fn setting(&self, id: SettingId) -> Option<SettingUpdate> {
        self.settings.get(id as usize).copied()
    }

    pub fn brightness(&self) -> u8 {
        match self.settings[SettingId::Brightness as usize] {
            SettingUpdate::Brightness(level) => level,
            _ => 255,
        }
    }

    /// Well-formed packets seen (including faulted ones)
    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    /// True while the badge ignores input until a run of 0xFF
    pub fn awaiting_sync(&self) -> bool {
        self.awaiting_sync
    }

    /// Feed bytes written by the host; returns the encoded replies
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        self.rx.extend_from_slice(bytes);

        loop {
            if self.awaiting_sync && !self.consume_sync_run() {
                break;
            }

            // Anything before a sync byte is noise (including sync runs)
            match self.rx.iter().position(|&b| b == SYNC_BYTE) {
                Some(start) => {
                    self.rx.drain(..start);
                }
                None => {
                    self.rx.clear();
                    break;
                }
            }
            if self.rx.len() < HEADER_LEN {
                break;
            }

            let header = match FrameHeader::parse(&self.rx) {
                Ok(header) => header,
                Err(e) => {
                    log::debug!("Sim: {}", e);
                    Self::reply(
                        &mut out,
                        Response::Error {
                            code: ErrorCode::CorruptPacketHeader,
                            cookie: 0,
                        },
                    );
                    self.rx.drain(..1);
                    continue;
                }
            };
            let end = HEADER_LEN + header.len as usize;
            if self.rx.len() < end {
                break;
            }
            let payload: Vec<u8> = self.rx.drain(..end).skip(HEADER_LEN).collect();
            self.handle_packet(header, &payload, &mut out);
        }
        out
    }

    /// Eat bytes until a full 0xFF run has been seen
    fn consume_sync_run(&mut self) -> bool {
        let mut used = 0;
        let mut done = false;
        for &b in &self.rx {
            used += 1;
            if b == 0xFF {
                self.sync_count += 1;
                if self.sync_count >= SYNC_RUN_LEN - 1 {
                    done = true;
                    break;
                }
            } else {
                self.sync_count = 0;
            }
        }
        self.rx.drain(..used);
        if done {
            log::debug!("Sim: resynchronized");
            self.awaiting_sync = false;
            self.sync_count = 0;
        }
        done
    }

    fn handle_packet(&mut self, header: FrameHeader, payload: &[u8], out: &mut Vec<u8>) {
        self.packets_received += 1;
        let cookie = header.cookie;

        if self.faults.drop_packets > 0 {
            self.faults.drop_packets -= 1;
            return;
        }
        let corrupt = !header.payload_matches(payload);
        if corrupt || self.faults.corrupt_packets > 0 {
            if !corrupt {
                self.faults.corrupt_packets -= 1;
            }
            Self::reply(
                out,
                Response::Error {
                    code: ErrorCode::CorruptPacketData,
                    cookie,
                },
            );
            return;
        }
        if self.faults.overrun_packets > 0 {
            self.faults.overrun_packets -= 1;
            self.awaiting_sync = true;
            Self::reply(
                out,
                Response::Error {
                    code: ErrorCode::ReceiveBufferOverrun,
                    cookie,
                },
            );
            return;
        }

        if cookie != 0 && !self.faults.mute_acks {
            Self::reply(
                out,
                Response::Ack {
                    source: AckSource::PacketReceived,
                    cookie,
                },
            );
        }

        let mut pos = 0;
        while pos < payload.len() {
            match Command::decode(&payload[pos..]) {
                Ok((command, used)) => {
                    pos += used;
                    if let Some(response) = self.execute(command, cookie) {
                        Self::reply(out, response);
                    }
                }
                Err(e) => {
                    log::debug!("Sim: bad command: {}", e);
                    self.awaiting_sync = true;
                    Self::reply(
                        out,
                        Response::Error {
                            code: ErrorCode::BadSerialCommand,
                            cookie,
                        },
                    );
                    return;
                }
            }
        }
    }

    fn execute(&mut self, command: Command, cookie: u8) -> Option<Response> {
        match command {
            Command::Ping { cookie } => Some(Response::Ack {
                source: AckSource::Ping,
                cookie,
            }),
            Command::QuerySetting(id) => Some(Response::Setting(self.report(id))),
            Command::UpdateSetting(update) => {
                self.settings[update.id() as usize] = update;
                None
            }
            Command::Swap { .. } => {
                std::mem::swap(&mut self.front, &mut self.back);
                self.swaps += 1;
                None
            }
            Command::ReadRect {
                target,
                format,
                x,
                y,
                width,
                height,
            } => {
                let data = self.read_rect(target, format, x, y, width, height);
                Some(Response::Pixels {
                    format,
                    width,
                    height,
                    data,
                })
            }
            Command::WriteRect {
                target,
                format,
                x,
                y,
                width,
                height,
                data,
            } => {
                self.write_rect(target, format, x, y, width, height, &data);
                None
            }
            Command::CopyRect {
                src,
                dst,
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
            } => {
                let format = self.caps.pixel_format();
                let data = self.read_rect(src, format, src_x, src_y, width, height);
                self.write_rect(dst, format, dst_x, dst_y, width, height, &data);
                None
            }
            Command::FillRect {
                target,
                x,
                y,
                width,
                height,
                value,
            } => {
                let format = self.caps.pixel_format();
                let [hi, lo] = value.to_be_bytes();
                let block: &[u8] = match format {
                    PixelFormat::OneBit => &[hi],
                    PixelFormat::TwoBits => &[hi, lo],
                };
                let data = block.repeat(width as usize * height as usize);
                self.write_rect(target, format, x, y, width, height, &data);
                None
            }
            Command::ReadMemory { address, dwords } => {
                let start = address as usize;
                let end = start + dwords as usize * 4;
                if end > self.eeprom.len() {
                    return Some(Self::out_of_bounds(cookie));
                }
                Some(Response::Memory {
                    address,
                    data: self.eeprom[start..end].to_vec(),
                })
            }
            Command::WriteMemory { address, data } => {
                let start = address as usize;
                let end = start + data.len();
                if end > self.eeprom.len() {
                    return Some(Self::out_of_bounds(cookie));
                }
                self.eeprom[start..end].copy_from_slice(&data);
                None
            }
            Command::PlayFromBookmark { state, bookmark } => {
                self.settings[SettingId::AnimPlayState as usize] =
                    SettingUpdate::AnimPlayState(state);
                if let Some(pos) = bookmark {
                    self.settings[SettingId::AnimReadPos as usize] =
                        SettingUpdate::AnimReadPos(pos);
                }
                None
            }
        }
    }

    fn report(&self, id: SettingId) -> SettingReport {
        match id {
            SettingId::ButtonState => SettingReport::ButtonState(self.buttons),
            SettingId::BufferFullness => SettingReport::BufferFullness(0),
            SettingId::Caps => SettingReport::Caps(self.caps.report()),
            writable => SettingReport::Value(self.settings[writable as usize]),
        }
    }

    fn buffer_mut(&mut self, target: Target) -> &mut Vec<u8> {
        match target {
            Target::BackBuffer => &mut self.back,
            Target::FrontBuffer => &mut self.front,
        }
    }

    /// Rect in `format`; 1-bit reads of a 2-bit buffer merge both planes
    fn read_rect(
        &mut self,
        target: Target,
        format: PixelFormat,
        x: u8,
        y: u8,
        width: u8,
        height: u8,
    ) -> Vec<u8> {
        let stride_blocks = self.caps.width_in_blocks();
        let device_format = self.caps.pixel_format();
        let device_rows = self.caps.height as usize;
        let buffer = self.buffer_mut(target);
        let mut data = Vec::with_capacity(width as usize * height as usize * 2);
        for row in y as usize..(y + height) as usize {
            for block in x as usize..(x + width) as usize {
                let planes = if row < device_rows && block < stride_blocks {
                    let at = (row * stride_blocks + block) * device_format.bytes_per_block();
                    match device_format {
                        PixelFormat::OneBit => [buffer[at], 0],
                        PixelFormat::TwoBits => [buffer[at], buffer[at + 1]],
                    }
                } else {
                    [0, 0]
                };
                match (format, device_format) {
                    (PixelFormat::OneBit, PixelFormat::TwoBits) => data.push(planes[0] | planes[1]),
                    (PixelFormat::OneBit, PixelFormat::OneBit) => data.push(planes[0]),
                    (PixelFormat::TwoBits, PixelFormat::OneBit) => {
                        data.extend_from_slice(&[planes[0], planes[0]])
                    }
                    (PixelFormat::TwoBits, PixelFormat::TwoBits) => data.extend_from_slice(&planes),
                }
            }
        }
        data
    }

    /// 1-bit writes into a 2-bit buffer light pixels at full level; clipped to the device
    #[allow(clippy::too_many_arguments)]
    fn write_rect(
        &mut self,
        target: Target,
        format: PixelFormat,
        x: u8,
        y: u8,
        width: u8,
        height: u8,
        data: &[u8],
    ) {
        let stride_blocks = self.caps.width_in_blocks();
        let device_format = self.caps.pixel_format();
        let device_rows = self.caps.height as usize;
        let per_block = format.bytes_per_block();
        let buffer = self.buffer_mut(target);
        let mut src = data.chunks_exact(per_block);
        for row in y as usize..(y + height) as usize {
            for block in x as usize..(x + width) as usize {
                let Some(bytes) = src.next() else {
                    return;
                };
                if row >= device_rows || block >= stride_blocks {
                    continue;
                }
                let planes = match format {
                    PixelFormat::OneBit => [bytes[0], bytes[0]],
                    PixelFormat::TwoBits => [bytes[0], bytes[1]],
                };
                let at = (row * stride_blocks + block) * device_format.bytes_per_block();
                buffer[at] = planes[0];
                if device_format == PixelFormat::TwoBits {
                    buffer[at + 1] = planes[1];
                }
            }
        }
    }

    fn out_of_bounds(cookie: u8) -> Response {
        Response::Error {
            code: ErrorCode::EepromWriteOutOfBounds,
            cookie,
        }
    }

    fn reply(out: &mut Vec<u8>, response: Response) {
        response.encode(out);
    }
}
