//! Mock transport for testing

use super::{SimulatedBadge, Transport};
use crate::error::Result;
use crate::link::frame::{split_frames, FrameHeader};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory transport
///
/// Clones share state, so a test can keep one handle while the link owns
/// another. With a [`SimulatedBadge`] attached, everything written is fed
/// to the device and its replies become readable.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    device: Option<SimulatedBadge>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                device: None,
            })),
        }
    }

    /// Mock wired to a simulated badge
    pub fn with_device(device: SimulatedBadge) -> Self {
        let mock = Self::new();
        mock.inner.lock().device = Some(device);
        mock
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Everything written so far
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Well-formed packets among the written bytes
    pub fn written_frames(&self) -> Vec<(FrameHeader, Vec<u8>)> {
        split_frames(&self.inner.lock().write_buffer)
    }

    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Run `f` against the attached device, if any
    pub fn device<R>(&self, f: impl FnOnce(&mut SimulatedBadge) -> R) -> Option<R> {
        self.inner.lock().device.as_mut().map(f)
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let count = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.write_buffer.extend_from_slice(data);
        if let Some(device) = inner.device.as_mut() {
            let replies = device.receive(data);
            inner.read_buffer.extend(replies);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
