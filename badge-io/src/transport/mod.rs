//! Byte transports under the badge link

use crate::error::{Error, Result};

mod mock;
mod serial;
pub mod sim;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use sim::{FaultConfig, SimulatedBadge};

/// Raw byte stream to a badge
pub trait Transport: Send {
    /// Read available data into buffer, returns number of bytes read (0 on timeout)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Bytes waiting to be read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Write the whole buffer
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "transport accepted no bytes",
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }
}
