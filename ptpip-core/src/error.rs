//! Error types for ptpip-core

/// Result type alias for ptpip-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Read past the end of a buffer
    #[error("Out of bounds: {width} byte(s) at offset {offset}, buffer is {len} bytes")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Read a position that was never written
    #[error("Byte at offset {0} was never written")]
    UnsetByte(usize),

    /// Integer width other than 1, 2, 4 or 8
    #[error("Unsupported integer width: {0}")]
    UnsupportedWidth(usize),

    /// Packet is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Packet header declares an unknown kind
    #[error("Unknown packet kind: {0}")]
    UnknownPacketKind(u32),

    /// Unknown operation code
    #[error("Unknown operation code: 0x{0:04X}")]
    UnknownOperation(u16),

    /// Unknown response code
    #[error("Unknown response code: 0x{0:04X}")]
    UnknownResponse(u16),

    /// Unknown event code
    #[error("Unknown event code: 0x{0:04X}")]
    UnknownEvent(u16),

    /// Device property code with no known property id
    #[error("Unknown device property code: 0x{0:04X}")]
    UnknownPropertyCode(u16),

    /// Device property data type tag not recognised
    #[error("Unknown device property data type: 0x{0:04X}")]
    UnknownDataType(u16),

    /// Device property structure byte not recognised
    #[error("Unknown device property structure: {0}")]
    UnknownStructure(u8),

    /// Value does not match the declared data type
    #[error("Value type mismatch: expected {expected}")]
    ValueTypeMismatch {
        expected: &'static str,
    },

    /// A dataset field could not be read
    #[error("Malformed {dataset}: missing {field}")]
    MalformedDataset {
        dataset: &'static str,
        field: &'static str,
    },

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    #[error("Type error: {0}")]
    Types(#[from] ptpip_types::Error),
}

impl Error {
    /// Whether this is a decode failure for a single record, which a scan may step over
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::UnsetByte(_)
                | Self::UnknownPropertyCode(_)
                | Self::UnknownDataType(_)
                | Self::UnknownStructure(_)
                | Self::MalformedDataset { .. }
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::InvalidSessionState(_))
    }
}
