//! # ptpip
//!
//! Client for cameras that speak the Picture Transfer Protocol over TCP/IP.
//!
//! ## Features
//!
//! - Async/await API using Tokio
//! - Control and event streams driven by a single background task
//! - Sony SDIO handshake with retry when another client holds the camera
//! - Device property cache kept current from device events
//! - Bounded capture flow: focus, shutter, object wait and download
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ptpip::{Camera, CameraConfig, MemorySink, PropertyCode};
//!
//! #[tokio::main]
//! async fn main() -> ptpip::Result<()> {
//!     // Connect and run the handshake
//!     let sink = Arc::new(MemorySink::new());
//!     let camera = Camera::connect(CameraConfig::new("192.168.122.1"), sink.clone()).await?;
//!     println!("{}", camera.device_info());
//!
//!     // Read a property
//!     let iso = camera.get_device_prop_desc(PropertyCode::Iso).await?;
//!     println!("ISO: {:?}", iso.current_value);
//!
//!     // Take a picture
//!     let outcome = camera.take_picture().await?;
//!     println!("{:?}", outcome);
//!
//!     camera.disconnect().await
//! }
//! ```

pub mod camera;
pub mod capture;
pub mod client;
mod dispatch;
pub mod error;

#[cfg(test)]
mod fake_device;

// Re-exports
pub use camera::{Camera, CameraConfig};
pub use capture::{CaptureOutcome, CaptureSink, CaptureState, MemorySink};
pub use client::PtpIpClient;
pub use error::{Error, Result};

// Re-export protocol types
pub use ptpip_core::{
    ClientIdentity, CommandResponse, DeviceProperty, EventCode, EventPacket, OperationCode,
    PropertyCode, PropertyValue, ResponseCode, SessionState,
};
pub use ptpip_transport::{TcpTransport, Transport};
pub use ptpip_types::{DeviceInfo, FocusMode, Manufacturer, ObjectInfo, ShootingMode};
