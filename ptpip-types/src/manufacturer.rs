//! Manufacturer-specific enumerations

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Camera manufacturer, selects vendor encodings and handshakes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Manufacturer {
    #[default]
    Sony,
    Canon,
}

impl Manufacturer {
    /// Guess the manufacturer from the `DeviceInfo` manufacturer string
    pub fn from_device_string(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl FromStr for Manufacturer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        if lower.contains("sony") {
            Ok(Self::Sony)
        } else if lower.contains("canon") {
            Ok(Self::Canon)
        } else {
            Err(Error::UnknownManufacturer(s.to_string()))
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sony => write!(f, "Sony"),
            Self::Canon => write!(f, "Canon"),
        }
    }
}

/// Focus mode as reported by the `focusMode` (0x500a) property
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Manual,
    AutoSingle,
    AutoContinuous,
    Auto,
    DirectManual,
    PowerFocus,
    /// Raw value without a known meaning
    Other(u16),
}

impl FocusMode {
    /// Decode a raw focus mode value for the given manufacturer
    pub fn from_raw(manufacturer: Manufacturer, raw: u16) -> Self {
        match manufacturer {
            Manufacturer::Sony => match raw {
                0x0001 => Self::Manual,
                0x0002 => Self::AutoSingle,
                0x8004 => Self::AutoContinuous,
                0x8005 => Self::Auto,
                0x8006 => Self::DirectManual,
                0x8009 => Self::PowerFocus,
                other => Self::Other(other),
            },
            // Standard PTP values
            Manufacturer::Canon => match raw {
                0x0001 => Self::Manual,
                0x0002 => Self::Auto,
                other => Self::Other(other),
            },
        }
    }

    /// Raw wire value for the given manufacturer
    pub fn to_raw(self, manufacturer: Manufacturer) -> u16 {
        match (manufacturer, self) {
            (_, Self::Manual) => 0x0001,
            (Manufacturer::Sony, Self::AutoSingle) => 0x0002,
            (Manufacturer::Sony, Self::AutoContinuous) => 0x8004,
            (Manufacturer::Sony, Self::Auto) => 0x8005,
            (Manufacturer::Sony, Self::DirectManual) => 0x8006,
            (Manufacturer::Sony, Self::PowerFocus) => 0x8009,
            (_, Self::Other(raw)) => raw,
            (Manufacturer::Canon, _) => 0x0002,
        }
    }

    /// Whether the camera will hunt for focus before releasing the shutter
    pub fn is_auto_focus(self) -> bool {
        !matches!(self, Self::Manual | Self::PowerFocus | Self::Other(_))
    }
}

/// Shooting mode, used to key captured media
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ShootingMode {
    #[default]
    Photo,
    Video,
    Continuous,
    HighFrameRate,
    Bracket,
}

impl ShootingMode {
    /// Derive the shooting mode from Sony's exposure program mode and still capture mode
    pub fn from_sony(exposure_program_mode: Option<u32>, still_capture_mode: Option<u32>) -> Self {
        match exposure_program_mode.map(|mode| mode >> 16) {
            Some(0x0007) => return Self::Video,
            Some(0x0008) => return Self::HighFrameRate,
            _ => {}
        }

        match still_capture_mode {
            Some(0x0002 | 0x8012 | 0x8010 | 0x8031) => Self::Continuous,
            Some(mode) if mode & 0xff00 == 0x8300 => Self::Bracket,
            _ => Self::Photo,
        }
    }
}

impl fmt::Display for ShootingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Continuous => "continuous",
            Self::HighFrameRate => "high-frame-rate",
            Self::Bracket => "bracket",
        };
        f.write_str(name)
    }
}
