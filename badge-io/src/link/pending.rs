//! Reliable packets awaiting acknowledgment

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Attempts (first send included) before a packet is reported as failed
pub const MAX_ATTEMPTS: u32 = 5;

/// A reliable packet owned by the link until acked, retired or exhausted
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub cookie: u8,
    /// 1 for the first send
    pub attempt: u32,
    pub sent_at: Instant,
    pub payload: Vec<u8>,
}

impl PendingPacket {
    pub fn is_expired(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) > interval
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= MAX_ATTEMPTS
    }
}

/// Pending packets in send order, oldest at the head
///
/// Entries are only ever appended, so the head is always the first to
/// expire and the sweep never has to look past it.
#[derive(Debug, Default)]
pub struct PendingList {
    packets: VecDeque<PendingPacket>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: PendingPacket) {
        self.packets.push_back(packet);
    }

    /// Remove the packet carrying `cookie`
    pub fn remove(&mut self, cookie: u8) -> Option<PendingPacket> {
        let index = self.packets.iter().position(|p| p.cookie == cookie)?;
        self.packets.remove(index)
    }

    /// Pop the head if it has been waiting longer than `interval`
    pub fn pop_expired(&mut self, now: Instant, interval: Duration) -> Option<PendingPacket> {
        if self.packets.front()?.is_expired(now, interval) {
            self.packets.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn cookies(&self) -> impl Iterator<Item = u8> + '_ {
        self.packets.iter().map(|p| p.cookie)
    }
}
