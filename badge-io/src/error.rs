//! Error types for badge-io

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// badge-io error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error (port missing, already open, bad settings)
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    Config(String),

    /// Link is closed or was never opened
    #[error("Not connected")]
    NotConnected,

    /// Pump already has a link attached
    #[error("Already connected")]
    AlreadyConnected,

    /// All 255 packet ids are in flight
    #[error("Packet ids exhausted: 255 reliable packets already outstanding")]
    PacketIdsExhausted,

    /// Payload cannot be framed (single command larger than one packet, or unparseable batch)
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending length
        len: usize,
        /// Largest payload one packet can carry
        max: usize,
    },

    /// Invalid packet or response
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Opcode nibble has no meaning in this direction
    #[error("Unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    /// Setting id nibble has no meaning
    #[error("Unknown setting id: {0:#x}")]
    UnknownSetting(u8),

    /// Error code nibble has no meaning
    #[error("Unknown error code: {0:#x}")]
    UnknownErrorCode(u8),

    /// Buffer ends before the message does
    #[error("Truncated message: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to decode
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Frame pump was disposed
    #[error("Frame pump terminated")]
    PumpTerminated,

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
