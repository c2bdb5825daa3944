//! # Printer Transport Layer
//!
//! The connection manager never touches sockets directly. It drives an
//! [`Adapter`]: an explicit handle to the local Bluetooth radio, passed in at
//! construction, that can open outbound links, listen for inbound ones and
//! stop device discovery.
//!
//! ## Available Adapters
//!
//! - `bluetooth::RfcommAdapter`: Linux BlueZ RFCOMM sockets (Linux only)
//!
//! Tests drive the manager with in-memory adapters built on
//! `tokio::io::duplex`.
//!
//! ## Streams
//!
//! An established link is any `AsyncRead + AsyncWrite` byte stream. Dropping
//! the stream closes the link.

#[cfg(target_os = "linux")]
pub mod bluetooth;

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::PrinterError;

#[cfg(target_os = "linux")]
pub use bluetooth::RfcommAdapter;

/// A remote Bluetooth device, as reported by discovery or pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteDevice {
    /// Bluetooth address, `XX:XX:XX:XX:XX:XX`
    pub address: String,
    /// Human-readable name
    pub name: String,
}

impl RemoteDevice {
    /// Device with a display name.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Device known only by address; the address doubles as its name.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
        }
    }
}

impl fmt::Display for RemoteDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// The service a listener advertises and an outbound link targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service name for the SDP record
    pub name: String,
    /// Service class UUID
    pub uuid: Uuid,
    /// RFCOMM channel
    pub channel: u8,
}

impl ServiceRecord {
    /// Serial Port Profile UUID, `00001101-0000-1000-8000-00805F9B34FB`
    pub const SERIAL_PORT_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

    /// Service name used by mini printers and their companion apps.
    pub const SERIAL_PORT_NAME: &'static str = "MiniThermalPrinter";

    /// The Serial Port Profile record on `channel`.
    pub fn serial_port(channel: u8) -> Self {
        Self {
            name: Self::SERIAL_PORT_NAME.to_string(),
            uuid: Self::SERIAL_PORT_UUID,
            channel,
        }
    }
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self::serial_port(1)
    }
}

/// # Bluetooth Adapter
///
/// Handle to the local radio. Implementations must be cheap to share: the
/// manager keeps one in an `Arc` and calls it from several tasks.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Established duplex link.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Bound listening endpoint.
    type Acceptor: Acceptor<Stream = Self::Stream>;

    /// Stop any device discovery in progress. Best effort: discovery slows
    /// down connection setup, but failing to stop it is not an error.
    async fn cancel_discovery(&self);

    /// Bind a listening endpoint for `service`.
    async fn listen(&self, service: &ServiceRecord) -> Result<Self::Acceptor, PrinterError>;

    /// Open an outbound link to `device`.
    ///
    /// Dropping the returned future aborts the attempt and closes its socket.
    async fn connect(
        &self,
        device: &RemoteDevice,
        service: &ServiceRecord,
    ) -> Result<Self::Stream, PrinterError>;
}

/// # Listening Endpoint
///
/// Dropping the acceptor closes the endpoint.
#[async_trait]
pub trait Acceptor: Send + 'static {
    /// Accepted duplex link.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next inbound link.
    async fn accept(&mut self) -> Result<(Self::Stream, RemoteDevice), PrinterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_port_uuid() {
        assert_eq!(
            ServiceRecord::SERIAL_PORT_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_default_service() {
        let service = ServiceRecord::default();
        assert_eq!(service.channel, 1);
        assert_eq!(service.name, "MiniThermalPrinter");
    }

    #[test]
    fn test_device_display() {
        let named = RemoteDevice::new("00:11:22:33:44:55", "MTP-II");
        assert_eq!(named.to_string(), "MTP-II (00:11:22:33:44:55)");

        let bare = RemoteDevice::from_address("00:11:22:33:44:55");
        assert_eq!(bare.to_string(), "00:11:22:33:44:55");
        assert_eq!(bare.name, bare.address);
    }
}
