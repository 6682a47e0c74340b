//! Device information dataset

use std::fmt;

/// Snapshot of the `GetDeviceInfo` dataset, decoded once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Standard version (e.g. 100 for 1.00)
    pub version: u16,

    /// Vendor extension id (0x11 for Sony, 0x0b for Canon...)
    pub vendor_extension_id: u32,

    /// Vendor extension version
    pub vendor_extension_version: u16,

    /// Vendor extension description
    pub vendor_extension_description: Option<String>,

    /// Functional mode
    pub functional_mode: u16,

    /// Operation codes the device accepts
    pub supported_operations: Vec<u16>,

    /// Event codes the device may send
    pub supported_events: Vec<u16>,

    /// Device property codes the device describes
    pub supported_properties: Vec<u16>,

    /// Capture formats
    pub supported_capture_formats: Vec<u16>,

    /// Image formats
    pub supported_image_formats: Vec<u16>,

    /// Manufacturer name
    pub manufacturer: Option<String>,

    /// Model name, best-effort
    pub model: Option<String>,

    /// Device firmware version, best-effort
    pub device_version: Option<String>,

    /// Serial number, best-effort
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    /// Check whether the device lists an operation code
    pub fn supports_operation(&self, code: u16) -> bool {
        self.supported_operations.contains(&code)
    }

    /// Check whether the device lists a device property code
    pub fn supports_property(&self, code: u16) -> bool {
        self.supported_properties.contains(&code)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{} {}, FW: {}, SN: {}]",
            self.manufacturer.as_deref().unwrap_or("?"),
            self.model.as_deref().unwrap_or("?"),
            self.device_version.as_deref().unwrap_or("?"),
            self.serial_number.as_deref().unwrap_or("?"),
        )
    }
}
