//! Object information dataset

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Metadata for an object (image, movie...) stored on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub format: u16,
    pub protection_status: u16,
    /// Size of the object in bytes
    pub compressed_size: u32,
    pub thumbnail_format: u16,
    pub thumbnail_compressed_size: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub bit_depth: u32,
    pub parent_object: u32,
    pub association_type: u16,
    pub association_description: u32,
    pub sequence_number: u32,
    pub file_name: Option<String>,
    pub capture_date: Option<NaiveDateTime>,
    pub modification_date: Option<NaiveDateTime>,
    pub keywords: Option<String>,
}

impl ObjectInfo {
    /// File name reported by the device, or one derived from the object handle
    pub fn file_name_or(&self, handle: u32) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{:08x}.jpg", handle))
    }
}

/// Parse a dataset date-time string (`YYYYMMDDThhmmss[.s][Z|+hhmm]`).
///
/// Tenths of a second and any timezone suffix are ignored.
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    let base = value.get(..15).ok_or_else(|| Error::InvalidDateTime(value.to_string()))?;
    NaiveDateTime::parse_from_str(base, "%Y%m%dT%H%M%S")
        .map_err(|_| Error::InvalidDateTime(value.to_string()))
}
