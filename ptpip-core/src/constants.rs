//! Protocol constants

use std::time::Duration;

/// Default PTP/IP port for both the control and event streams
pub const DEFAULT_PORT: u16 = 15740;

/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to wait for a command response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts at the full connect sequence before giving up
pub const CONNECT_ATTEMPTS: usize = 3;

/// Longest friendly name sent in the init command request
pub const FRIENDLY_NAME_MAX_CHARS: usize = 80;

/// Length of the client GUID
pub const GUID_LENGTH: usize = 16;

/// Protocol version sent in the init command request (1.0)
pub const PROTOCOL_VERSION_MAJOR: u16 = 1;
pub const PROTOCOL_VERSION_MINOR: u16 = 0;

/// Session id used by OpenSession
pub const SESSION_ID: u32 = 1;

/// Outbound data payloads at least this long get a separate continue-data packet
pub const INLINE_DATA_LIMIT: usize = 128;

/// Capture timing
pub mod capture {
    use std::time::Duration;

    /// How long to wait for focus before releasing the shutter
    pub const FOCUS_TIMEOUT: Duration = Duration::from_secs(1);

    /// How long to wait for the captured object to become available
    pub const OBJECT_TIMEOUT: Duration = Duration::from_secs(35);

    /// Tick of the bounded polling waits
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
}

/// Sony-specific values
pub mod sony {
    /// Argument to SdioGetExtDeviceInfo
    pub const EXT_DEVICE_INFO_VERSION: u32 = 0x12c;

    /// `objectInMemory` values at or above this mean a capture is waiting in the buffer
    pub const OBJECT_IN_MEMORY_THRESHOLD: u16 = 0x8000;

    /// Handle of the in-memory capture
    pub const IN_MEMORY_OBJECT_ID: u32 = 0xffff_c001;

    /// Button values for SetControlDeviceB
    pub const BUTTON_UP: u16 = 1;
    pub const BUTTON_DOWN: u16 = 2;
}
