//! badge-io - Serial link and frame pump for LED matrix badges
//!
//! The crate talks to a small serial-attached LED matrix ("badge") using a
//! bit-packed command protocol, and keeps a framebuffer on it refreshed at a
//! fixed rate over an unreliable link.
//!
//! ## Layers
//!
//! - [`protocol`]: command and response codec, settings, device caps
//! - [`pixel`]: gray to bit-plane packing, dithering, render target
//! - [`link`]: framed, checksummed, acknowledged packets over a [`transport`]
//! - [`pump`]: fixed-rate render, pack and send loop
//! - [`dispatch`]: where decoded responses go

pub mod config;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod pixel;
pub mod protocol;
pub mod pump;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use dispatch::{BufferedDispatcher, CallbackHandler, NullHandler, ResponseHandler};
pub use error::{Error, Result};
pub use link::{BadgeLink, LinkOptions};
pub use pixel::RenderTarget;
pub use protocol::{Command, DeviceCaps, DevicePreset, Response};
pub use pump::{FrameHooks, FramePump, PumpSettings, PumpState};
