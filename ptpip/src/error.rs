//! High-level error types

use ptpip_core::{OperationCode, ResponseCode};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] ptpip_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] ptpip_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] ptpip_types::Error),

    #[error("Camera not connected")]
    NotConnected,

    /// The device refused the init handshake
    #[error("Device rejected the connection (reason 0x{0:08X})")]
    InitFailed(u32),

    /// The session went away while a request was pending
    #[error("Disconnected while waiting for the device")]
    Disconnected,

    /// The device answered with an error response code
    #[error("{operation} failed: {}", describe_code(.code))]
    CommandFailed {
        operation: OperationCode,
        code: Option<ResponseCode>,
    },

    #[error("Another client already has a session open")]
    AnotherSessionOpen,

    #[error("Operation not supported: {0}")]
    OperationNotSupported(OperationCode),

    #[error("Captured object not found")]
    ObjectNotFound,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("A capture is already in progress")]
    CaptureInProgress,
}

fn describe_code(code: &Option<ResponseCode>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "no response code".into(),
    }
}

impl Error {
    /// Build the error for a failed command, singling out the codes callers act on
    pub fn from_response(operation: OperationCode, code: Option<ResponseCode>) -> Self {
        match code {
            Some(ResponseCode::AnotherSessionOpen) => Self::AnotherSessionOpen,
            Some(ResponseCode::OperationNotSupported) => Self::OperationNotSupported(operation),
            code => Self::CommandFailed { operation, code },
        }
    }

    /// Worth retrying the whole connect sequence
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, Self::AnotherSessionOpen | Self::OperationNotSupported(_))
    }

    /// The session is still usable after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. }
                | Self::OperationNotSupported(_)
                | Self::ObjectNotFound
                | Self::Timeout(_)
                | Self::CaptureInProgress
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::NotConnected | Self::Disconnected | Self::InitFailed(_) => true,
            Self::Transport(e) => e.is_fatal(),
            Self::Core(e) => e.requires_reconnect(),
            _ => false,
        }
    }
}
