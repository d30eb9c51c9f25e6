//! Serial line seam used by the master. One session per exchange.

pub mod reply;
pub mod serial;

use log::info;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use thiserror::Error;

use crate::config::{FlowControlConfig, ParityConfig, StopBitsConfig};

pub use reply::{read_reply, ReplyLength};
pub use serial::{SerialPortSession, SerialPortTransport};

/// Above this rate the inter-frame gap is fixed rather than 3.5 characters.
const FIXED_SILENCE_BAUD: u32 = 19200;
const FIXED_SILENCE: Duration = Duration::from_micros(1750);
/// Start + 8 data + parity/stop + stop.
const BITS_PER_CHAR: u64 = 11;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Port not found: {0}")]
    NotFound(String),

    #[error("Port already owned: {0}")]
    AlreadyOwned(String),

    #[error("Failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Configuration failed: {0}")]
    ConfigFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// An identified, not yet opened port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHandle {
    pub name: String,
}

impl PortHandle {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBitsConfig,
    pub parity: ParityConfig,
    pub flow_control: FlowControlConfig,
}

impl LineSettings {
    /// Minimum silence that terminates an RTU frame.
    pub fn inter_frame_silence(&self) -> Duration {
        if self.baud_rate == 0 || self.baud_rate > FIXED_SILENCE_BAUD {
            return FIXED_SILENCE;
        }
        // 3.5 character times
        Duration::from_micros(BITS_PER_CHAR * 3_500_000 / self.baud_rate as u64)
    }
}

pub trait SerialTransport {
    type Session: SerialSession;

    fn identify(&self, port_name: &str) -> Result<PortHandle, TransportError>;

    /// Opens the port for exclusive use by the caller.
    fn open(&self, handle: &PortHandle, timeout: Duration) -> Result<Self::Session, TransportError>;
}

pub trait SerialSession {
    fn configure(&mut self, settings: &LineSettings) -> Result<(), TransportError>;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads whatever arrives within `timeout`. `Ok(0)` means nothing did.
    fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    fn close(&mut self);
}

/// Owns a session for one exchange and closes it when dropped.
pub struct SessionGuard<S: SerialSession> {
    session: S,
    port: String,
}

impl<S: SerialSession> SessionGuard<S> {
    pub fn new(session: S, port: &str) -> Self {
        Self { session, port: port.to_string() }
    }
}

impl<S: SerialSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: SerialSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: SerialSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
        info!("🔒 Released serial port {}", self.port);
    }
}
