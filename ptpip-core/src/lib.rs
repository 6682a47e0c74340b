//! # ptpip-core
//!
//! Protocol engine for PTP/IP camera clients.
//!
//! This crate provides the low-level protocol primitives:
//! - A byte buffer with little-endian cursor access and unset-byte tracking
//! - Packet structure, encoding/decoding and incremental stream framing
//! - Operation, response, event and device property code tables
//! - Device property, DeviceInfo and ObjectInfo decoding
//! - Transaction id allocation and handshake state

#[macro_use]
mod macros;

pub mod buffer;
pub mod command;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod identity;
pub mod packet;
pub mod property;
pub mod session;
pub mod stream;

pub use buffer::{ByteBuffer, CharWidth, LeInteger};
pub use command::{EventCode, OperationCode, ResponseCode};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use identity::ClientIdentity;
pub use packet::{CommandRequest, CommandResponse, EventPacket, Header, Packet, PacketKind};
pub use property::{
    DataType, DeviceProperty, GetSetAvailable, GetSetSupported, PropertyCode, PropertyHeader,
    PropertyShape, PropertyStructure, PropertyValue, SetPropertyValue,
};
pub use session::{Session, SessionState};
pub use stream::PacketStream;
