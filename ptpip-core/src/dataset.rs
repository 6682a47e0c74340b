//! Decoding of the DeviceInfo and ObjectInfo datasets

use ptpip_types::{parse_datetime, DeviceInfo, ObjectInfo};

use crate::{
    buffer::{ByteBuffer, LeInteger},
    error::{Error, Result},
};

/// A dataset received in the data phase of a command
pub trait Dataset: Sized {
    /// Decode from the start of `buf`
    fn decode(buf: &ByteBuffer) -> Result<Self>;
}

/// Read a required integer field, naming it on failure
fn field<T: LeInteger>(
    buf: &ByteBuffer,
    offset: &mut usize,
    dataset: &'static str,
    field: &'static str,
) -> Result<T> {
    buf.read(offset)
        .map_err(|_| Error::MalformedDataset { dataset, field })
}

fn array(buf: &ByteBuffer, offset: &mut usize, dataset: &'static str, field: &'static str) -> Result<Vec<u16>> {
    buf.read_array(offset)
        .map_err(|_| Error::MalformedDataset { dataset, field })
}

/// A string that must at least have its count byte
fn string(buf: &ByteBuffer, offset: &mut usize) -> Option<Option<String>> {
    buf.byte(*offset).ok()?;
    Some(buf.read_wide_string(offset, true))
}

impl Dataset for DeviceInfo {
    fn decode(buf: &ByteBuffer) -> Result<Self> {
        const NAME: &str = "DeviceInfo";
        let mut offset = 0;

        let mut info = DeviceInfo {
            version: field(buf, &mut offset, NAME, "version")?,
            vendor_extension_id: field(buf, &mut offset, NAME, "vendor extension id")?,
            vendor_extension_version: field(buf, &mut offset, NAME, "vendor extension version")?,
            vendor_extension_description: buf.read_wide_string(&mut offset, true),
            functional_mode: field(buf, &mut offset, NAME, "functional mode")?,
            supported_operations: array(buf, &mut offset, NAME, "supported operations")?,
            supported_events: array(buf, &mut offset, NAME, "supported events")?,
            supported_properties: array(buf, &mut offset, NAME, "supported properties")?,
            supported_capture_formats: array(buf, &mut offset, NAME, "capture formats")?,
            supported_image_formats: array(buf, &mut offset, NAME, "image formats")?,
            manufacturer: buf.read_wide_string(&mut offset, true),
            ..Default::default()
        };

        // Trailing strings stop at the first one that isn't there
        let trailing = [&mut info.model, &mut info.device_version, &mut info.serial_number];
        for slot in trailing {
            match string(buf, &mut offset) {
                Some(value) => *slot = value,
                None => break,
            }
        }

        Ok(info)
    }
}

impl Dataset for ObjectInfo {
    fn decode(buf: &ByteBuffer) -> Result<Self> {
        const NAME: &str = "ObjectInfo";
        let mut offset = 0;

        let mut info = ObjectInfo {
            storage_id: field(buf, &mut offset, NAME, "storage id")?,
            format: field(buf, &mut offset, NAME, "format")?,
            protection_status: field(buf, &mut offset, NAME, "protection status")?,
            compressed_size: field(buf, &mut offset, NAME, "compressed size")?,
            thumbnail_format: field(buf, &mut offset, NAME, "thumbnail format")?,
            thumbnail_compressed_size: field(buf, &mut offset, NAME, "thumbnail size")?,
            thumbnail_width: field(buf, &mut offset, NAME, "thumbnail width")?,
            thumbnail_height: field(buf, &mut offset, NAME, "thumbnail height")?,
            image_width: field(buf, &mut offset, NAME, "image width")?,
            image_height: field(buf, &mut offset, NAME, "image height")?,
            bit_depth: field(buf, &mut offset, NAME, "bit depth")?,
            parent_object: field(buf, &mut offset, NAME, "parent object")?,
            association_type: field(buf, &mut offset, NAME, "association type")?,
            association_description: field(buf, &mut offset, NAME, "association description")?,
            sequence_number: field(buf, &mut offset, NAME, "sequence number")?,
            file_name: buf.read_wide_string(&mut offset, true),
            ..Default::default()
        };

        info.capture_date = string(buf, &mut offset)
            .flatten()
            .and_then(|date| parse_datetime(&date).ok());
        info.modification_date = string(buf, &mut offset)
            .flatten()
            .and_then(|date| parse_datetime(&date).ok());
        info.keywords = string(buf, &mut offset).flatten();

        Ok(info)
    }
}
