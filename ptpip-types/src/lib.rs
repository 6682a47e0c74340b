//! Type definitions for ptpip

pub mod device_info;
pub mod error;
pub mod manufacturer;
pub mod object_info;

pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use manufacturer::{FocusMode, Manufacturer, ShootingMode};
pub use object_info::{parse_datetime, ObjectInfo};
