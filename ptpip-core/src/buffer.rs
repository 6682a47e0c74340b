//! Growable byte buffer with little-endian cursor access
//!
//! Positions that were never written are tracked explicitly: writing past the
//! end pads the gap with unset bytes, and reading an unset byte fails with
//! [`Error::UnsetByte`] rather than returning zero.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::error::{Error, Result};

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width integer that can be read from and written to a [`ByteBuffer`]
pub trait LeInteger: sealed::Sealed + Copy {
    /// Width in bytes
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` little-endian bytes
    fn from_le(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` little-endian bytes
    fn write_le(self, out: &mut [u8]);
}

impl sealed::Sealed for u8 {}
impl LeInteger for u8 {
    const WIDTH: usize = 1;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl sealed::Sealed for i8 {}
impl LeInteger for i8 {
    const WIDTH: usize = 1;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

macro_rules! le_integer {
    ($($ty:ty => $width:expr, $read:ident, $write:ident;)*) => {
        $(
            impl sealed::Sealed for $ty {}
            impl LeInteger for $ty {
                const WIDTH: usize = $width;

                fn from_le(bytes: &[u8]) -> Self {
                    LittleEndian::$read(bytes)
                }

                fn write_le(self, out: &mut [u8]) {
                    LittleEndian::$write(out, self)
                }
            }
        )*
    };
}

le_integer! {
    u16 => 2, read_u16, write_u16;
    i16 => 2, read_i16, write_i16;
    u32 => 4, read_u32, write_u32;
    i32 => 4, read_i32, write_i32;
    u64 => 8, read_u64, write_u64;
    i64 => 8, read_i64, write_i64;
}

/// Character encoding used by string fields
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CharWidth {
    /// One byte per character
    Narrow,
    /// Two bytes per character (UCS-2), the PTP default
    Wide,
}

impl CharWidth {
    pub const fn size(self) -> usize {
        match self {
            Self::Narrow => 1,
            Self::Wide => 2,
        }
    }
}

/// Growable byte sequence with optional (unset) positions
///
/// # Examples
///
/// ```
/// use ptpip_core::ByteBuffer;
///
/// let mut buf = ByteBuffer::new();
/// buf.append(0x2001u16);
/// buf.append(7u32);
///
/// let mut offset = 0;
/// assert_eq!(buf.read::<u16>(&mut offset).unwrap(), 0x2001);
/// assert_eq!(buf.read::<u32>(&mut offset).unwrap(), 7);
/// assert_eq!(offset, 6);
/// assert!(buf.read::<u8>(&mut offset).is_err());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<Option<u8>>,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Parse a hex string two characters at a time.
    ///
    /// Whitespace and any other non-hex characters are ignored, and a trailing
    /// odd digit is dropped.
    pub fn from_hex(hex_string: &str) -> Self {
        let mut digits: String = hex_string
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        if digits.len() % 2 != 0 {
            digits.pop();
        }

        // Every character is a hex digit and the length is even
        let bytes = hex::decode(&digits).unwrap_or_default();
        Self::from(bytes)
    }

    /// Render every set byte as two lowercase hex digits separated by spaces
    pub fn to_hex(&self) -> String {
        self.bytes
            .iter()
            .flatten()
            .map(|byte| hex::encode([*byte]))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Number of positions, including unset ones
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Set bytes only, in order
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().flatten().copied().collect()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_vec())
    }

    /// Read the byte at `index`
    pub fn byte(&self, index: usize) -> Result<u8> {
        match self.bytes.get(index) {
            Some(Some(byte)) => Ok(*byte),
            Some(None) => Err(Error::UnsetByte(index)),
            None => Err(Error::OutOfBounds {
                offset: index,
                width: 1,
                len: self.len(),
            }),
        }
    }

    /// Write the byte at `index`, padding any gap with unset positions
    pub fn set_byte(&mut self, index: usize, value: u8) {
        if index >= self.bytes.len() {
            self.bytes.resize(index + 1, None);
        }
        self.bytes[index] = Some(value);
    }

    fn read_into(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(out.len()).unwrap_or(usize::MAX);
        if end > self.len() {
            return Err(Error::OutOfBounds {
                offset,
                width: out.len(),
                len: self.len(),
            });
        }

        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.byte(offset + i)?;
        }
        Ok(())
    }

    /// Read an integer at `offset` without a cursor
    pub fn read_at<T: LeInteger>(&self, offset: usize) -> Result<T> {
        let mut raw = [0u8; 8];
        self.read_into(offset, &mut raw[..T::WIDTH])?;
        Ok(T::from_le(&raw[..T::WIDTH]))
    }

    /// Read an integer at the cursor, advancing it only on success
    pub fn read<T: LeInteger>(&self, offset: &mut usize) -> Result<T> {
        let value = self.read_at(*offset)?;
        *offset += T::WIDTH;
        Ok(value)
    }

    /// Write an integer at `offset`, extending the buffer if needed
    pub fn set<T: LeInteger>(&mut self, offset: usize, value: T) {
        let mut raw = [0u8; 8];
        value.write_le(&mut raw[..T::WIDTH]);
        for (i, byte) in raw[..T::WIDTH].iter().enumerate() {
            self.set_byte(offset + i, *byte);
        }
    }

    /// Append an integer at the end of the buffer
    pub fn append<T: LeInteger>(&mut self, value: T) {
        let end = self.len();
        self.set(end, value);
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend(bytes.iter().copied().map(Some));
    }

    /// Little-endian unsigned read of `width` bytes (1, 2, 4 or 8)
    pub fn read_unsigned(&self, offset: &mut usize, width: usize) -> Result<u64> {
        match width {
            1 => self.read::<u8>(offset).map(u64::from),
            2 => self.read::<u16>(offset).map(u64::from),
            4 => self.read::<u32>(offset).map(u64::from),
            8 => self.read::<u64>(offset),
            other => Err(Error::UnsupportedWidth(other)),
        }
    }

    /// Two's-complement reinterpretation of the same bytes as [`Self::read_unsigned`]
    pub fn read_signed(&self, offset: &mut usize, width: usize) -> Result<i64> {
        match width {
            1 => self.read::<i8>(offset).map(i64::from),
            2 => self.read::<i16>(offset).map(i64::from),
            4 => self.read::<i32>(offset).map(i64::from),
            8 => self.read::<i64>(offset),
            other => Err(Error::UnsupportedWidth(other)),
        }
    }

    /// Append the low `width` bytes of `value`
    pub fn append_unsigned(&mut self, value: u64, width: usize) -> Result<()> {
        match width {
            1 => self.append(value as u8),
            2 => self.append(value as u16),
            4 => self.append(value as u32),
            8 => self.append(value),
            other => return Err(Error::UnsupportedWidth(other)),
        }
        Ok(())
    }

    pub fn append_signed(&mut self, value: i64, width: usize) -> Result<()> {
        self.append_unsigned(value as u64, width)
    }

    fn read_char(&self, offset: usize, width: CharWidth) -> Option<u16> {
        match width {
            CharWidth::Narrow => self.read_at::<u8>(offset).ok().map(u16::from),
            CharWidth::Wide => self.read_at::<u16>(offset).ok(),
        }
    }

    /// Read a wide string, see [`Self::read_string_with`]
    pub fn read_wide_string(&self, offset: &mut usize, with_length_prefix: bool) -> Option<String> {
        self.read_string_with(offset, with_length_prefix, CharWidth::Wide)
    }

    /// Read a string of `width` characters.
    ///
    /// With a length prefix, a one-byte character count (which includes the
    /// null terminator) precedes the text. Without one, characters are read up to a
    /// null or the end of the buffer. Reading stops early at a null or an unreadable
    /// character, and the cursor moves past the text plus the terminator if one was
    /// present. An empty result is `None`.
    pub fn read_string_with(
        &self,
        offset: &mut usize,
        with_length_prefix: bool,
        width: CharWidth,
    ) -> Option<String> {
        let size = width.size();
        let mut cursor = *offset;
        let mut units: Vec<u16> = Vec::new();
        let mut terminated = false;

        if with_length_prefix {
            let count = self.read::<u8>(&mut cursor).ok()? as usize;
            for i in 0..count {
                match self.read_char(cursor + i * size, width) {
                    Some(0) => {
                        terminated = true;
                        break;
                    }
                    Some(unit) => units.push(unit),
                    None => break,
                }
            }
            if !terminated
                && count > 0
                && units.len() == count
                && self.read_char(cursor + count * size, width) == Some(0)
            {
                terminated = true;
            }
        } else {
            while let Some(unit) = self.read_char(cursor + units.len() * size, width) {
                if unit == 0 {
                    terminated = true;
                    break;
                }
                units.push(unit);
            }
        }

        cursor += units.len() * size;
        if terminated {
            cursor += size;
        }
        *offset = cursor;

        if units.is_empty() {
            return None;
        }

        Some(match width {
            CharWidth::Wide => String::from_utf16_lossy(&units),
            CharWidth::Narrow => units.iter().map(|unit| char::from(*unit as u8)).collect(),
        })
    }

    /// Append a wide string followed by a null terminator
    pub fn append_wide_string(&mut self, value: &str, with_length_prefix: bool) {
        self.append_string_with(value, with_length_prefix, CharWidth::Wide);
    }

    pub fn append_string_with(&mut self, value: &str, with_length_prefix: bool, width: CharWidth) {
        let units: Vec<u16> = match width {
            CharWidth::Wide => value.encode_utf16().collect(),
            CharWidth::Narrow => value.chars().map(|c| c as u32 as u8 as u16).collect(),
        };

        if with_length_prefix {
            let count = (units.len() + 1).min(u8::MAX as usize);
            self.append(count as u8);
        }

        for unit in units {
            match width {
                CharWidth::Wide => self.append(unit),
                CharWidth::Narrow => self.append(unit as u8),
            }
        }

        match width {
            CharWidth::Wide => self.append(0u16),
            CharWidth::Narrow => self.append(0u8),
        }
    }

    /// Read a `u32` count followed by that many `u16` elements.
    ///
    /// Elements that cannot be read end the array early instead of failing it.
    pub fn read_array(&self, offset: &mut usize) -> Result<Vec<u16>> {
        let count = self.read::<u32>(offset)?;
        let mut elements = Vec::new();
        for _ in 0..count {
            match self.read::<u16>(offset) {
                Ok(element) => elements.push(element),
                Err(_) => break,
            }
        }
        Ok(elements)
    }

    pub fn append_array(&mut self, values: &[u16]) {
        self.append(values.len() as u32);
        for value in values {
            self.append(*value);
        }
    }

    /// Copy of `[from, to)`, clamped to the buffer bounds
    pub fn sliced(&self, from: usize, to: Option<usize>) -> ByteBuffer {
        let end = to.unwrap_or(self.len()).min(self.len());
        if from >= end {
            return ByteBuffer::new();
        }
        Self {
            bytes: self.bytes[from..end].to_vec(),
        }
    }

    /// Keep only `[from, to)`, clamped to the buffer bounds
    pub fn slice(&mut self, from: usize, to: Option<usize>) {
        let end = to.unwrap_or(self.len()).min(self.len());
        if from >= end {
            self.bytes.clear();
            return;
        }
        self.bytes.truncate(end);
        self.bytes.drain(..from);
    }

    /// Drop the first `count` positions
    pub fn advance(&mut self, count: usize) {
        self.slice(count, None);
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_iter().map(Some).collect(),
        }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
        }
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .field("hex", &self.to_hex())
            .finish()
    }
}
