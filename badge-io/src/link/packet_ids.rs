//! Packet id arena
//!
//! Ids 1..=255 identify reliable packets until the badge acknowledges them.
//! Id 0 is never handed out: on the wire it means "no ack wanted".

/// Number of usable packet ids
pub const MAX_IN_FLIGHT: usize = 255;

/// 255 slots indexed by id, each free or in flight
#[derive(Debug, Clone)]
pub struct PacketIdPool {
    in_flight: [bool; MAX_IN_FLIGHT + 1],
    used: usize,
}

impl PacketIdPool {
    pub fn new() -> Self {
        Self {
            in_flight: [false; MAX_IN_FLIGHT + 1],
            used: 0,
        }
    }

    /// Mark every id free
    pub fn reset(&mut self) {
        self.in_flight = [false; MAX_IN_FLIGHT + 1];
        self.used = 0;
    }

    /// Take the lowest free id
    pub fn allocate(&mut self) -> Option<u8> {
        let id = (1..=MAX_IN_FLIGHT).find(|&id| !self.in_flight[id])?;
        self.in_flight[id] = true;
        self.used += 1;
        Some(id as u8)
    }

    /// Return an id; false if it was not in flight
    pub fn release(&mut self, id: u8) -> bool {
        if id == 0 || !self.in_flight[id as usize] {
            return false;
        }
        self.in_flight[id as usize] = false;
        self.used -= 1;
        true
    }

    pub fn is_free(&self, id: u8) -> bool {
        id != 0 && !self.in_flight[id as usize]
    }

    pub fn free_count(&self) -> usize {
        MAX_IN_FLIGHT - self.used
    }

    /// Ids currently in flight, ascending
    pub fn in_flight_ids(&self) -> Vec<u8> {
        (1..=MAX_IN_FLIGHT)
            .filter(|&id| self.in_flight[id])
            .map(|id| id as u8)
            .collect()
    }
}

impl Default for PacketIdPool {
    fn default() -> Self {
        Self::new()
    }
}
