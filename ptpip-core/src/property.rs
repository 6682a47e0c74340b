//! Device property descriptions and values

use bytes::Bytes;
use ptpip_types::Manufacturer;

use crate::{
    buffer::{ByteBuffer, CharWidth},
    error::{Error, Result},
};

code_table! {
    /// Data type tag of a device property
    pub enum DataType: UnknownDataType {
        Int8 = 0x0001 => "INT8",
        UInt8 = 0x0002 => "UINT8",
        Int16 = 0x0003 => "INT16",
        UInt16 = 0x0004 => "UINT16",
        Int32 = 0x0005 => "INT32",
        UInt32 = 0x0006 => "UINT32",
        Int64 = 0x0007 => "INT64",
        UInt64 = 0x0008 => "UINT64",
        /// Length-prefixed UCS-2 string
        WideString = 0xffff => "STR",
        /// Length-prefixed single byte string (Canon)
        NarrowString = 0xf1f1 => "STR8",
    }
}

impl DataType {
    /// Width in bytes of integer types
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 => Some(4),
            Self::Int64 | Self::UInt64 => Some(8),
            Self::WideString | Self::NarrowString => None,
        }
    }
}

code_table! {
    /// Known device property codes
    pub enum PropertyCode: UnknownPropertyCode {
        Undefined = 0x5000 => "Undefined",
        BatteryLevel = 0x5001 => "BatteryLevel",
        FunctionalMode = 0x5002 => "FunctionalMode",
        ImageSize = 0x5003 => "ImageSize",
        CompressionSetting = 0x5004 => "CompressionSetting",
        WhiteBalance = 0x5005 => "WhiteBalance",
        RgbGain = 0x5006 => "RGBGain",
        FNumber = 0x5007 => "FNumber",
        FocalLength = 0x5008 => "FocalLength",
        FocusDistance = 0x5009 => "FocusDistance",
        FocusMode = 0x500a => "FocusMode",
        ExposureMeteringMode = 0x500b => "ExposureMeteringMode",
        FlashMode = 0x500c => "FlashMode",
        ExposureTime = 0x500d => "ExposureTime",
        ExposureProgramMode = 0x500e => "ExposureProgramMode",
        ExposureIndex = 0x500f => "ExposureIndex",
        ExposureBiasCompensation = 0x5010 => "ExposureBiasCompensation",
        DateTime = 0x5011 => "DateTime",
        CaptureDelay = 0x5012 => "CaptureDelay",
        StillCaptureMode = 0x5013 => "StillCaptureMode",
        Contrast = 0x5014 => "Contrast",
        Sharpness = 0x5015 => "Sharpness",
        DigitalZoom = 0x5016 => "DigitalZoom",
        EffectMode = 0x5017 => "EffectMode",
        BurstNumber = 0x5018 => "BurstNumber",
        BurstInterval = 0x5019 => "BurstInterval",
        TimelapseNumber = 0x501a => "TimelapseNumber",
        TimelapseInterval = 0x501b => "TimelapseInterval",
        FocusMeteringMode = 0x501c => "FocusMeteringMode",
        UploadUrl = 0x501d => "UploadURL",
        Artist = 0x501e => "Artist",
        CopyrightInfo = 0x501f => "CopyrightInfo",

        // Canon
        MeteringModeCanon = 0xd010 => "Canon_MeteringMode",
        WhiteBalanceCanon = 0xd013 => "Canon_WhiteBalance",
        DriveModeCanon = 0xd00e => "Canon_DriveMode",
        IsoSpeedCanon = 0xd01c => "Canon_ISOSpeed",
        ApertureCanon = 0xd01d => "Canon_Aperture",
        ShutterSpeedCanon = 0xd01e => "Canon_ShutterSpeed",
        ExpCompensationCanon = 0xd01f => "Canon_ExpCompensation",
        DpofVersionCanon = 0xd046 => "Canon_DPOFVersion",
        ModelIdCanon = 0xd049 => "Canon_ModelID",
        PowerZoomPositionEos = 0xd055 => "EOS_PowerZoomPosition",
        ApertureEos = 0xd101 => "EOS_Aperture",
        ShutterSpeedEos = 0xd102 => "EOS_ShutterSpeed",
        IsoSpeedEos = 0xd103 => "EOS_ISOSpeed",
        ExpCompensationEos = 0xd104 => "EOS_ExpCompensation",
        AutoExposureModeEos = 0xd105 => "EOS_AutoExposureMode",
        DriveModeEos = 0xd106 => "EOS_DriveMode",
        MeteringModeEos = 0xd107 => "EOS_MeteringMode",
        FocusModeEos = 0xd108 => "EOS_FocusMode",
        WhiteBalanceEos = 0xd109 => "EOS_WhiteBalance",
        ColorTemperatureEos = 0xd10a => "EOS_ColorTemperature",
        WhiteBalanceAdjustAEos = 0xd10b => "EOS_WhiteBalanceAdjustA",
        WhiteBalanceAdjustBEos = 0xd10c => "EOS_WhiteBalanceAdjustB",
        ColorSpaceEos = 0xd10f => "EOS_ColorSpace",
        PictureStyleEos = 0xd110 => "EOS_PictureStyle",
        BatteryPowerEos = 0xd111 => "EOS_BatteryPower",
        BatterySelectEos = 0xd112 => "EOS_BatterySelect",
        CameraTimeEos = 0xd113 => "EOS_CameraTime",
        AutoPowerOffEos = 0xd114 => "EOS_AutoPowerOff",
        OwnerEos = 0xd115 => "EOS_Owner",
        PtpExtensionVersionEos = 0xd119 => "EOS_PTPExtensionVersion",
        DpofVersionEos = 0xd11a => "EOS_DPOFVersion",
        AvailableShotsEos = 0xd11b => "EOS_AvailableShots",
        CaptureDestinationEos = 0xd11c => "EOS_CaptureDestination",
        BracketModeEos = 0xd11d => "EOS_BracketMode",
        CurrentStorageEos = 0xd11e => "EOS_CurrentStorage",
        CurrentFolderEos = 0xd11f => "EOS_CurrentFolder",
        ImageFormatEos = 0xd120 => "EOS_ImageFormat",

        // Sony
        DpcCompensation = 0xd200 => "Sony_DPCCompensation",
        DRangeOptimize = 0xd201 => "Sony_DRangeOptimize",
        ImageSizeSony = 0xd203 => "Sony_ImageSize",
        ShutterSpeed = 0xd20d => "Sony_ShutterSpeed",
        Unknown0xd20e = 0xd20e => "Sony_0xD20E",
        ColorTemp = 0xd20f => "Sony_ColorTemp",
        CcFilter = 0xd210 => "Sony_CCFilter",
        AspectRatio = 0xd211 => "Sony_AspectRatio",
        FocusFound = 0xd213 => "Sony_FocusFound",
        ObjectInMemory = 0xd215 => "Sony_ObjectInMemory",
        ExposeIndex = 0xd216 => "Sony_ExposeIndex",
        BatteryLevelSony = 0xd218 => "Sony_BatteryLevel",
        PictureEffect = 0xd21b => "Sony_PictureEffect",
        AbFilter = 0xd21c => "Sony_ABFilter",
        Iso = 0xd21e => "Sony_ISO",
        ExposureSettingsLockStatus = 0xd22a => "Sony_ExposureSettingsLockStatus",
        MovieFormat = 0xd241 => "Sony_MovieFormat",
        MovieQuality = 0xd242 => "Sony_MovieQuality",
        StorageState = 0xd248 => "Sony_StorageState",
        RemainingShots = 0xd249 => "Sony_RemainingShots",
        RemainingCaptureTime = 0xd24a => "Sony_RemainingCaptureTime",
        StillQuality = 0xd252 => "Sony_StillQuality",
        StillFormat = 0xd253 => "Sony_StillFormat",
        ExposureProgramModeControl = 0xd25a => "Sony_ExposureProgramModeControl",
        ZoomPosition = 0xd25d => "Sony_ZoomPosition",
        RecordingDuration = 0xd261 => "Sony_RecordingDuration",
        LiveViewQuality = 0xd26a => "Sony_LiveViewQuality",
        LiveViewUrl = 0xd278 => "Sony_LiveViewURL",
        AutoFocus = 0xd2c1 => "Sony_AutoFocus",
        Capture = 0xd2c2 => "Sony_Capture",
        StillImage = 0xd2c7 => "Sony_StillImage",
        Movie = 0xd2c8 => "Sony_Movie",
        ExposureSettingsLock = 0xd2d5 => "Sony_ExposureSettingsLock",
        PerformZoom = 0xd2dd => "Sony_PerformZoom",
    }
}

impl PropertyCode {
    /// Data type used to encode values of this property for a manufacturer
    ///
    /// # Examples
    ///
    /// ```
    /// use ptpip_core::{DataType, PropertyCode};
    /// use ptpip_types::Manufacturer;
    ///
    /// assert_eq!(PropertyCode::Iso.data_type(Manufacturer::Sony), DataType::UInt32);
    /// assert_eq!(PropertyCode::FocusFound.data_type(Manufacturer::Sony), DataType::UInt8);
    /// assert_eq!(PropertyCode::Contrast.data_type(Manufacturer::Canon), DataType::UInt32);
    /// ```
    pub fn data_type(self, manufacturer: Manufacturer) -> DataType {
        match manufacturer {
            Manufacturer::Sony => match self {
                Self::ExposureProgramMode | Self::Iso | Self::ShutterSpeed | Self::StillCaptureMode => {
                    DataType::UInt32
                }
                Self::FlashMode
                | Self::FNumber
                | Self::FocusMode
                | Self::MovieQuality
                | Self::WhiteBalance => DataType::UInt16,
                Self::ExposureSettingsLock
                | Self::ExposureProgramModeControl
                | Self::FocusFound
                | Self::LiveViewQuality
                | Self::MovieFormat
                | Self::StillFormat
                | Self::StillQuality => DataType::UInt8,
                Self::ExposureBiasCompensation => DataType::Int16,
                _ => DataType::UInt16,
            },
            Manufacturer::Canon => match self {
                Self::AutoExposureModeEos
                | Self::ApertureEos
                | Self::ApertureCanon
                | Self::ShutterSpeedEos
                | Self::ShutterSpeedCanon
                | Self::IsoSpeedCanon
                | Self::IsoSpeedEos
                | Self::FocusModeEos
                | Self::ColorSpaceEos
                | Self::BatteryPowerEos
                | Self::BatterySelectEos
                | Self::PtpExtensionVersionEos
                | Self::DriveModeCanon
                | Self::DriveModeEos
                | Self::BracketModeEos
                | Self::AutoPowerOffEos
                | Self::DpofVersionEos
                | Self::DpofVersionCanon
                | Self::ImageFormatEos => DataType::UInt16,
                Self::PictureStyleEos
                | Self::WhiteBalanceCanon
                | Self::WhiteBalanceEos
                | Self::MeteringModeEos
                | Self::MeteringModeCanon
                | Self::ExpCompensationCanon
                | Self::ExpCompensationEos => DataType::UInt8,
                Self::OwnerEos => DataType::NarrowString,
                Self::WhiteBalanceAdjustAEos | Self::WhiteBalanceAdjustBEos => DataType::Int32,
                _ => DataType::UInt32,
            },
        }
    }
}

/// Whether the device can ever set a property
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GetSetSupported {
    Get,
    GetSet,
    Unknown(u8),
}

impl From<u8> for GetSetSupported {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => Self::Get,
            0x01 => Self::GetSet,
            other => Self::Unknown(other),
        }
    }
}

impl From<GetSetSupported> for u8 {
    fn from(value: GetSetSupported) -> u8 {
        match value {
            GetSetSupported::Get => 0x00,
            GetSetSupported::GetSet => 0x01,
            GetSetSupported::Unknown(raw) => raw,
        }
    }
}

/// Whether a property can be set right now
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GetSetAvailable {
    Unavailable,
    GetSet,
    Get,
    Unknown(u8),
}

impl From<u8> for GetSetAvailable {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => Self::Unavailable,
            0x01 => Self::GetSet,
            0x02 => Self::Get,
            other => Self::Unknown(other),
        }
    }
}

impl From<GetSetAvailable> for u8 {
    fn from(value: GetSetAvailable) -> u8 {
        match value {
            GetSetAvailable::Unavailable => 0x00,
            GetSetAvailable::GetSet => 0x01,
            GetSetAvailable::Get => 0x02,
            GetSetAvailable::Unknown(raw) => raw,
        }
    }
}

/// Structure byte following the header values
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PropertyStructure {
    Other = 0x00,
    Range = 0x01,
    Enum = 0x02,
}

impl TryFrom<u8> for PropertyStructure {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Other),
            0x01 => Ok(Self::Range),
            0x02 => Ok(Self::Enum),
            other => Err(Error::UnknownStructure(other)),
        }
    }
}

/// A single property value, tagged with its wire type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    String(String),
    NarrowString(String),
}

impl PropertyValue {
    /// Read a value of `data_type` at the cursor, which only advances on success
    pub fn read(buf: &ByteBuffer, offset: &mut usize, data_type: DataType) -> Result<Self> {
        let mut cursor = *offset;
        let value = match data_type {
            DataType::Int8 => Self::Int8(buf.read(&mut cursor)?),
            DataType::UInt8 => Self::UInt8(buf.read(&mut cursor)?),
            DataType::Int16 => Self::Int16(buf.read(&mut cursor)?),
            DataType::UInt16 => Self::UInt16(buf.read(&mut cursor)?),
            DataType::Int32 => Self::Int32(buf.read(&mut cursor)?),
            DataType::UInt32 => Self::UInt32(buf.read(&mut cursor)?),
            DataType::Int64 => Self::Int64(buf.read(&mut cursor)?),
            DataType::UInt64 => Self::UInt64(buf.read(&mut cursor)?),
            DataType::WideString => {
                buf.byte(cursor)?;
                Self::String(buf.read_wide_string(&mut cursor, true).unwrap_or_default())
            }
            DataType::NarrowString => {
                buf.byte(cursor)?;
                Self::NarrowString(
                    buf.read_string_with(&mut cursor, true, CharWidth::Narrow)
                        .unwrap_or_default(),
                )
            }
        };
        *offset = cursor;
        Ok(value)
    }

    /// Build a value of `data_type` from an integer
    pub fn from_i64(data_type: DataType, raw: i64) -> Result<Self> {
        let mismatch = || Error::ValueTypeMismatch {
            expected: data_type.name(),
        };

        let value = match data_type {
            DataType::Int8 => Self::Int8(i8::try_from(raw).map_err(|_| mismatch())?),
            DataType::UInt8 => Self::UInt8(u8::try_from(raw).map_err(|_| mismatch())?),
            DataType::Int16 => Self::Int16(i16::try_from(raw).map_err(|_| mismatch())?),
            DataType::UInt16 => Self::UInt16(u16::try_from(raw).map_err(|_| mismatch())?),
            DataType::Int32 => Self::Int32(i32::try_from(raw).map_err(|_| mismatch())?),
            DataType::UInt32 => Self::UInt32(u32::try_from(raw).map_err(|_| mismatch())?),
            DataType::Int64 => Self::Int64(raw),
            DataType::UInt64 => Self::UInt64(u64::try_from(raw).map_err(|_| mismatch())?),
            DataType::WideString | DataType::NarrowString => return Err(mismatch()),
        };
        Ok(value)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::String(_) => DataType::WideString,
            Self::NarrowString(_) => DataType::NarrowString,
        }
    }

    /// Numeric value widened to `i64`, `None` for strings and out of range `u64`s
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int8(v) => Some(i64::from(*v)),
            Self::UInt8(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::String(_) | Self::NarrowString(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::NarrowString(s) => Some(s),
            _ => None,
        }
    }

    /// Append the value in its wire form
    pub fn encode(&self, buf: &mut ByteBuffer) {
        match self {
            Self::Int8(v) => buf.append(*v),
            Self::UInt8(v) => buf.append(*v),
            Self::Int16(v) => buf.append(*v),
            Self::UInt16(v) => buf.append(*v),
            Self::Int32(v) => buf.append(*v),
            Self::UInt32(v) => buf.append(*v),
            Self::Int64(v) => buf.append(*v),
            Self::UInt64(v) => buf.append(*v),
            Self::String(s) => buf.append_wide_string(s, true),
            Self::NarrowString(s) => buf.append_string_with(s, true, CharWidth::Narrow),
        }
    }
}

/// Fixed part of a property description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyHeader {
    pub code: PropertyCode,
    pub data_type: DataType,
    pub get_set_supported: GetSetSupported,
    pub get_set_available: GetSetAvailable,
    pub factory_value: PropertyValue,
    pub current_value: PropertyValue,
    pub structure: PropertyStructure,
    /// Bytes consumed, including the structure byte
    pub length: usize,
}

impl PropertyHeader {
    /// Decode a header starting at `offset`
    pub fn decode(buf: &ByteBuffer, offset: usize) -> Result<Self> {
        let mut cursor = offset;

        let code = PropertyCode::try_from(buf.read::<u16>(&mut cursor)?)?;
        let data_type = DataType::try_from(buf.read::<u16>(&mut cursor)?)?;
        let get_set_supported = GetSetSupported::from(buf.read::<u8>(&mut cursor)?);
        let get_set_available = GetSetAvailable::from(buf.read::<u8>(&mut cursor)?);
        let factory_value = PropertyValue::read(buf, &mut cursor, data_type)?;
        let current_value = PropertyValue::read(buf, &mut cursor, data_type)?;
        let structure = PropertyStructure::try_from(buf.read::<u8>(&mut cursor)?)?;

        Ok(Self {
            code,
            data_type,
            get_set_supported,
            get_set_available,
            factory_value,
            current_value,
            structure,
            length: cursor - offset,
        })
    }

    /// The property is advertised as settable
    pub fn is_get_set(&self) -> bool {
        self.get_set_supported == GetSetSupported::GetSet
    }
}

/// Variant part of a property description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyShape {
    Other,
    Range {
        min: PropertyValue,
        max: PropertyValue,
        step: PropertyValue,
    },
    Enum {
        available: Vec<PropertyValue>,
        supported: Vec<PropertyValue>,
    },
}

/// A complete device property description
///
/// # Examples
///
/// ```
/// use ptpip_core::{ByteBuffer, DeviceProperty, PropertyCode, PropertyShape};
///
/// let buf = ByteBuffer::from_hex("05 50 04 00 01 01 00 00 01 00 00");
/// let property = DeviceProperty::decode(&buf, 0).unwrap();
///
/// assert_eq!(property.code, PropertyCode::WhiteBalance);
/// assert_eq!(property.shape, PropertyShape::Other);
/// assert_eq!(property.length, 11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperty {
    pub code: PropertyCode,
    pub data_type: DataType,
    pub get_set_supported: GetSetSupported,
    pub get_set_available: GetSetAvailable,
    pub factory_value: PropertyValue,
    pub current_value: PropertyValue,
    pub shape: PropertyShape,
    /// Bytes consumed by the whole description
    pub length: usize,
}

impl DeviceProperty {
    /// Decode a property description starting at `offset`
    pub fn decode(buf: &ByteBuffer, offset: usize) -> Result<Self> {
        let header = PropertyHeader::decode(buf, offset)?;
        let mut cursor = offset + header.length;

        let shape = match header.structure {
            PropertyStructure::Other => PropertyShape::Other,
            PropertyStructure::Range => PropertyShape::Range {
                min: PropertyValue::read(buf, &mut cursor, header.data_type)?,
                max: PropertyValue::read(buf, &mut cursor, header.data_type)?,
                step: PropertyValue::read(buf, &mut cursor, header.data_type)?,
            },
            PropertyStructure::Enum => PropertyShape::Enum {
                available: read_values(buf, &mut cursor, header.data_type)?,
                supported: read_values(buf, &mut cursor, header.data_type)?,
            },
        };

        Ok(Self {
            code: header.code,
            data_type: header.data_type,
            get_set_supported: header.get_set_supported,
            get_set_available: header.get_set_available,
            factory_value: header.factory_value,
            current_value: header.current_value,
            shape,
            length: cursor - offset,
        })
    }

    /// Decode a GetAllDevicePropData block: a `u64` count then packed descriptions.
    ///
    /// Decoding stops at the first description that fails; those before it are kept.
    pub fn decode_all(buf: &ByteBuffer) -> Result<Vec<Self>> {
        let mut offset = 0;
        let count: u64 = buf.read(&mut offset)?;

        let mut properties = Vec::new();
        for _ in 0..count {
            match Self::decode(buf, offset) {
                Ok(property) => {
                    offset += property.length;
                    properties.push(property);
                }
                Err(e) => {
                    tracing::debug!(
                        "Stopped property scan at offset {} after {} of {}: {}",
                        offset,
                        properties.len(),
                        count,
                        e
                    );
                    break;
                }
            }
        }
        Ok(properties)
    }

    /// Encode the description in its wire form
    pub fn encode(&self) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.append(u16::from(self.code));
        buf.append(u16::from(self.data_type));
        buf.append(u8::from(self.get_set_supported));
        buf.append(u8::from(self.get_set_available));
        self.factory_value.encode(&mut buf);
        self.current_value.encode(&mut buf);

        match &self.shape {
            PropertyShape::Other => buf.append(PropertyStructure::Other as u8),
            PropertyShape::Range { min, max, step } => {
                buf.append(PropertyStructure::Range as u8);
                min.encode(&mut buf);
                max.encode(&mut buf);
                step.encode(&mut buf);
            }
            PropertyShape::Enum {
                available,
                supported,
            } => {
                buf.append(PropertyStructure::Enum as u8);
                for values in [available, supported] {
                    buf.append(values.len() as u16);
                    for value in values {
                        value.encode(&mut buf);
                    }
                }
            }
        }

        buf
    }

    /// Settable now and in general
    pub fn is_settable(&self) -> bool {
        self.get_set_supported == GetSetSupported::GetSet
            && self.get_set_available == GetSetAvailable::GetSet
    }

    /// Values the device currently accepts, for enumerated properties
    pub fn available_values(&self) -> Option<&[PropertyValue]> {
        match &self.shape {
            PropertyShape::Enum { available, .. } => Some(available),
            _ => None,
        }
    }
}

fn read_values(buf: &ByteBuffer, offset: &mut usize, data_type: DataType) -> Result<Vec<PropertyValue>> {
    let count: u16 = buf.read(offset)?;
    (0..count)
        .map(|_| PropertyValue::read(buf, offset, data_type))
        .collect()
}

/// Outbound property write.
///
/// The property code is the only command argument and the data phase carries
/// the value at the width the manufacturer uses for that property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPropertyValue {
    pub code: PropertyCode,
    pub value: PropertyValue,
}

impl SetPropertyValue {
    /// Encode `raw` with the manufacturer's data type for `code`
    pub fn new(code: PropertyCode, raw: i64, manufacturer: Manufacturer) -> Result<Self> {
        Ok(Self {
            code,
            value: PropertyValue::from_i64(code.data_type(manufacturer), raw)?,
        })
    }

    /// Command argument carrying the property code
    pub fn argument(&self) -> u32 {
        u32::from(u16::from(self.code))
    }

    /// Data phase payload
    pub fn data(&self) -> Bytes {
        let mut buf = ByteBuffer::new();
        self.value.encode(&mut buf);
        buf.to_bytes()
    }
}
