//! Transport layer for PTP/IP
//!
//! A PTP/IP connection uses two independent TCP streams to the same device,
//! one for commands and one for events. Each is a [`Transport`].

pub mod error;
pub mod tcp;

pub use error::{Error, Result};
pub use tcp::TcpTransport;

use async_trait::async_trait;
use bytes::BytesMut;

/// Duplex byte stream to a device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write all of `data`
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available, waiting up to the read timeout.
    ///
    /// Cancel safe: dropping the future before it resolves loses no data.
    async fn receive(&mut self) -> Result<BytesMut>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
