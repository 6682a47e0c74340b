//! PTP/IP packet structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    buffer::ByteBuffer,
    command::{EventCode, OperationCode, ResponseCode},
    constants::{GUID_LENGTH, INLINE_DATA_LIMIT, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR},
    error::{Error, Result},
};

/// Packet kind carried in the second header word
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketKind {
    InitCommandRequest = 1,
    InitCommandAck = 2,
    InitEventRequest = 3,
    InitEventAck = 4,
    InitFail = 5,
    CommandRequest = 6,
    CommandResponse = 7,
    Event = 8,
    StartData = 9,
    Data = 10,
    Cancel = 11,
    EndData = 12,
    Ping = 13,
    Pong = 14,
}

impl From<PacketKind> for u32 {
    fn from(kind: PacketKind) -> u32 {
        kind as u32
    }
}

impl TryFrom<u32> for PacketKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::InitCommandRequest),
            2 => Ok(Self::InitCommandAck),
            3 => Ok(Self::InitEventRequest),
            4 => Ok(Self::InitEventAck),
            5 => Ok(Self::InitFail),
            6 => Ok(Self::CommandRequest),
            7 => Ok(Self::CommandResponse),
            8 => Ok(Self::Event),
            9 => Ok(Self::StartData),
            10 => Ok(Self::Data),
            11 => Ok(Self::Cancel),
            12 => Ok(Self::EndData),
            13 => Ok(Self::Ping),
            14 => Ok(Self::Pong),
            _ => Err(Error::UnknownPacketKind(value)),
        }
    }
}

/// The 8-byte header in front of every packet
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    /// Total packet length including the header
    pub length: u32,
    pub kind: PacketKind,
}

impl Header {
    /// Read a header at `offset`.
    ///
    /// A zero length is rejected the same way as an unreadable one.
    pub fn read(buf: &ByteBuffer, offset: usize) -> Result<Self> {
        let length = buf.read_at::<u32>(offset)?;
        if length == 0 {
            return Err(Error::PacketTooShort {
                expected: Packet::HEADER_SIZE,
                actual: 0,
            });
        }
        let kind = PacketKind::try_from(buf.read_at::<u32>(offset + 4)?)?;
        Ok(Self { length, kind })
    }

    /// Payload length declared by the header
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(Packet::HEADER_SIZE)
    }
}

/// Operation request sent on the control stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub code: OperationCode,
    pub transaction_id: u32,
    pub arguments: Vec<u32>,
    /// An outbound data phase follows this request
    pub data_out: bool,
}

impl CommandRequest {
    /// Maximum number of arguments a request can carry
    pub const MAX_ARGUMENTS: usize = 5;
}

/// Operation response received on the control stream
///
/// A response whose body never arrived, or whose code is unknown, is kept as a
/// malformed response with neither a code nor a transaction id. Some devices
/// leave the transaction id out of otherwise valid responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub code: Option<ResponseCode>,
    pub transaction_id: Option<u32>,
    pub parameters: Vec<u32>,
    /// Length declared in the header, which may exceed what was read
    pub declared_length: u32,
    /// More bytes belonging to this response are expected
    pub awaiting_further_data: bool,
}

impl CommandResponse {
    /// Response with a known code
    pub fn new(code: ResponseCode, transaction_id: u32, parameters: Vec<u32>) -> Self {
        Self {
            code: Some(code),
            transaction_id: Some(transaction_id),
            declared_length: (Packet::HEADER_SIZE + 6 + parameters.len() * 4) as u32,
            parameters,
            awaiting_further_data: false,
        }
    }

    /// Header-only response whose body could not be decoded
    pub fn malformed(declared_length: u32) -> Self {
        Self {
            code: None,
            transaction_id: None,
            parameters: Vec::new(),
            declared_length,
            awaiting_further_data: declared_length as usize > Packet::HEADER_SIZE,
        }
    }

    /// True when the device reported anything other than OK
    pub fn is_error(&self) -> bool {
        self.code.is_some_and(ResponseCode::is_error)
    }
}

/// Asynchronous event received on the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket {
    /// Raw event code, see [`EventPacket::event_code`]
    pub code: u16,
    pub transaction_id: Option<u32>,
    pub parameters: Vec<u32>,
}

impl EventPacket {
    pub fn event_code(&self) -> Option<EventCode> {
        EventCode::try_from(self.code).ok()
    }

    /// First event parameter, usually an object handle or property code
    pub fn first_parameter(&self) -> Option<u32> {
        self.parameters.first().copied()
    }
}

/// PTP/IP packet
///
/// # Packet Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┐
/// │   Length    │    Kind     │   Payload   │
/// │   4 bytes   │   4 bytes   │   N bytes   │
/// │  (LE u32)   │  (LE u32)   │   (bytes)   │
/// └─────────────┴─────────────┴─────────────┘
/// ```
///
/// The length covers the header. All multi-byte values are little-endian.
///
/// # Examples
///
/// ```
/// use ptpip_core::{Packet, PacketKind};
///
/// let packet = Packet::InitEventRequest { session_id: 1 };
/// let encoded = packet.encode();
///
/// assert_eq!(encoded.len(), 12);
/// assert_eq!(packet.kind(), PacketKind::InitEventRequest);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum Packet {
    InitCommandRequest {
        guid: [u8; GUID_LENGTH],
        name: String,
    },
    InitCommandAck {
        session_id: u32,
        guid: [u8; GUID_LENGTH],
        name: Option<String>,
    },
    InitEventRequest {
        session_id: u32,
    },
    InitEventAck,
    InitFail {
        reason: u32,
    },
    CommandRequest(CommandRequest),
    CommandResponse(CommandResponse),
    Event(EventPacket),
    StartData {
        transaction_id: u32,
        total_length: u64,
    },
    Data {
        transaction_id: u32,
        payload: Bytes,
    },
    Cancel {
        transaction_id: u32,
    },
    EndData {
        transaction_id: u32,
        payload: Bytes,
    },
    Ping,
    Pong,
}

impl Packet {
    /// Packet header size in bytes
    pub const HEADER_SIZE: usize = 8;

    /// Build a command request
    pub fn command(code: OperationCode, transaction_id: u32, arguments: &[u32]) -> Self {
        Self::CommandRequest(CommandRequest {
            code,
            transaction_id,
            arguments: arguments.iter().take(CommandRequest::MAX_ARGUMENTS).copied().collect(),
            data_out: false,
        })
    }

    /// Build a command request that announces an outbound data phase
    pub fn command_with_data(code: OperationCode, transaction_id: u32, arguments: &[u32]) -> Self {
        match Self::command(code, transaction_id, arguments) {
            Self::CommandRequest(request) => Self::CommandRequest(CommandRequest {
                data_out: true,
                ..request
            }),
            other => other,
        }
    }

    /// Split an outbound payload into the data packets that carry it.
    ///
    /// Short payloads ride in the end-data packet, longer ones get their own
    /// data packet followed by an empty end-data.
    pub fn data_phase(transaction_id: u32, data: Bytes) -> Vec<Self> {
        let start = Self::StartData {
            transaction_id,
            total_length: data.len() as u64,
        };

        if data.len() < INLINE_DATA_LIMIT {
            vec![
                start,
                Self::EndData {
                    transaction_id,
                    payload: data,
                },
            ]
        } else {
            vec![
                start,
                Self::Data {
                    transaction_id,
                    payload: data,
                },
                Self::EndData {
                    transaction_id,
                    payload: Bytes::new(),
                },
            ]
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Self::InitCommandRequest { .. } => PacketKind::InitCommandRequest,
            Self::InitCommandAck { .. } => PacketKind::InitCommandAck,
            Self::InitEventRequest { .. } => PacketKind::InitEventRequest,
            Self::InitEventAck => PacketKind::InitEventAck,
            Self::InitFail { .. } => PacketKind::InitFail,
            Self::CommandRequest(_) => PacketKind::CommandRequest,
            Self::CommandResponse(_) => PacketKind::CommandResponse,
            Self::Event(_) => PacketKind::Event,
            Self::StartData { .. } => PacketKind::StartData,
            Self::Data { .. } => PacketKind::Data,
            Self::Cancel { .. } => PacketKind::Cancel,
            Self::EndData { .. } => PacketKind::EndData,
            Self::Ping => PacketKind::Ping,
            Self::Pong => PacketKind::Pong,
        }
    }

    /// Transaction id carried by the packet, if any
    pub fn transaction_id(&self) -> Option<u32> {
        match self {
            Self::CommandRequest(request) => Some(request.transaction_id),
            Self::CommandResponse(response) => response.transaction_id,
            Self::Event(event) => event.transaction_id,
            Self::StartData { transaction_id, .. }
            | Self::Data { transaction_id, .. }
            | Self::Cancel { transaction_id }
            | Self::EndData { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        }
    }

    fn encode_payload(&self) -> ByteBuffer {
        let mut buf = ByteBuffer::new();

        match self {
            Self::InitCommandRequest { guid, name } => {
                buf.append_bytes(guid);
                buf.append_wide_string(name, false);
                buf.append(PROTOCOL_VERSION_MINOR);
                buf.append(PROTOCOL_VERSION_MAJOR);
            }
            Self::InitCommandAck {
                session_id,
                guid,
                name,
            } => {
                buf.append(*session_id);
                buf.append_bytes(guid);
                buf.append_wide_string(name.as_deref().unwrap_or_default(), false);
                buf.append(PROTOCOL_VERSION_MINOR);
                buf.append(PROTOCOL_VERSION_MAJOR);
            }
            Self::InitEventRequest { session_id } => buf.append(*session_id),
            Self::InitFail { reason } => buf.append(*reason),
            Self::CommandRequest(request) => {
                buf.append(if request.data_out { 2u32 } else { 1u32 });
                buf.append(u16::from(request.code));
                buf.append(request.transaction_id);
                for argument in &request.arguments {
                    buf.append(*argument);
                }
            }
            Self::CommandResponse(response) => {
                if let Some(code) = response.code {
                    buf.append(u16::from(code));
                }
                if let Some(transaction_id) = response.transaction_id {
                    buf.append(transaction_id);
                }
                for parameter in &response.parameters {
                    buf.append(*parameter);
                }
            }
            Self::Event(event) => {
                buf.append(event.code);
                if let Some(transaction_id) = event.transaction_id {
                    buf.append(transaction_id);
                }
                for parameter in &event.parameters {
                    buf.append(*parameter);
                }
            }
            Self::StartData {
                transaction_id,
                total_length,
            } => {
                buf.append(*transaction_id);
                buf.append(*total_length as u32);
                buf.append((*total_length >> 32) as u32);
            }
            Self::Data {
                transaction_id,
                payload,
            }
            | Self::EndData {
                transaction_id,
                payload,
            } => {
                buf.append(*transaction_id);
                buf.append_bytes(payload);
            }
            Self::Cancel { transaction_id } => buf.append(*transaction_id),
            Self::InitEventAck | Self::Ping | Self::Pong => {}
        }

        buf
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> BytesMut {
        let payload = self.encode_payload().to_vec();
        let total_size = Self::HEADER_SIZE + payload.len();
        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_u32_le(total_size as u32);
        buf.put_u32_le(self.kind().into());
        buf.put_slice(&payload);

        buf
    }

    /// Decode the payload of a packet whose header has already been read.
    ///
    /// `payload` must hold exactly the bytes the header declared.
    pub fn decode_payload(kind: PacketKind, payload: &ByteBuffer) -> Result<Self> {
        let mut offset = 0;

        let packet = match kind {
            PacketKind::InitCommandRequest => {
                let guid = read_guid(payload, &mut offset)?;
                let name = payload.read_wide_string(&mut offset, false).unwrap_or_default();
                Self::InitCommandRequest { guid, name }
            }
            PacketKind::InitCommandAck => {
                let session_id = payload.read(&mut offset)?;
                let guid = read_guid(payload, &mut offset)?;
                let name = payload.read_wide_string(&mut offset, false);
                Self::InitCommandAck {
                    session_id,
                    guid,
                    name,
                }
            }
            PacketKind::InitEventRequest => Self::InitEventRequest {
                session_id: payload.read(&mut offset)?,
            },
            PacketKind::InitEventAck => Self::InitEventAck,
            PacketKind::InitFail => Self::InitFail {
                reason: payload.read_at(0).unwrap_or_default(),
            },
            PacketKind::CommandRequest => {
                let data_phase: u32 = payload.read(&mut offset)?;
                let code = OperationCode::try_from(payload.read::<u16>(&mut offset)?)?;
                let transaction_id = payload.read(&mut offset)?;
                Self::CommandRequest(CommandRequest {
                    code,
                    transaction_id,
                    arguments: read_parameters(payload, &mut offset),
                    data_out: data_phase == 2,
                })
            }
            PacketKind::CommandResponse => {
                let code = ResponseCode::try_from(payload.read::<u16>(&mut offset)?)?;
                let transaction_id = payload.read::<u32>(&mut offset).ok();
                Self::CommandResponse(CommandResponse {
                    code: Some(code),
                    transaction_id,
                    parameters: read_parameters(payload, &mut offset),
                    declared_length: (payload.len() + Self::HEADER_SIZE) as u32,
                    awaiting_further_data: false,
                })
            }
            PacketKind::Event => {
                let code = payload.read::<u16>(&mut offset)?;
                let transaction_id = payload.read::<u32>(&mut offset).ok();
                Self::Event(EventPacket {
                    code,
                    transaction_id,
                    parameters: read_parameters(payload, &mut offset),
                })
            }
            PacketKind::StartData => {
                let transaction_id = payload.read(&mut offset)?;
                let low: u32 = payload.read(&mut offset)?;
                let high: u32 = payload.read(&mut offset).unwrap_or_default();
                Self::StartData {
                    transaction_id,
                    total_length: (u64::from(high) << 32) | u64::from(low),
                }
            }
            PacketKind::Data => Self::Data {
                transaction_id: payload.read(&mut offset)?,
                payload: payload.sliced(offset, None).to_bytes(),
            },
            PacketKind::EndData => Self::EndData {
                transaction_id: payload.read(&mut offset)?,
                payload: payload.sliced(offset, None).to_bytes(),
            },
            PacketKind::Cancel => Self::Cancel {
                transaction_id: payload.read(&mut offset)?,
            },
            PacketKind::Ping => Self::Ping,
            PacketKind::Pong => Self::Pong,
        };

        Ok(packet)
    }

    /// Decode one complete packet at the start of `buf`
    pub fn decode(buf: &ByteBuffer) -> Result<Self> {
        let header = Header::read(buf, 0)?;
        if buf.len() < header.length as usize {
            return Err(Error::PacketTooShort {
                expected: header.length as usize,
                actual: buf.len(),
            });
        }
        let payload = buf.sliced(Self::HEADER_SIZE, Some(header.length as usize));
        Self::decode_payload(header.kind, &payload)
    }

    /// Get total packet size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.encode_payload().len()
    }
}

fn read_guid(buf: &ByteBuffer, offset: &mut usize) -> Result<[u8; GUID_LENGTH]> {
    let mut guid = [0u8; GUID_LENGTH];
    for byte in guid.iter_mut() {
        *byte = buf.read(offset)?;
    }
    Ok(guid)
}

fn read_parameters(buf: &ByteBuffer, offset: &mut usize) -> Vec<u32> {
    let mut parameters = Vec::new();
    while parameters.len() < CommandRequest::MAX_ARGUMENTS {
        match buf.read::<u32>(offset) {
            Ok(parameter) => parameters.push(parameter),
            Err(_) => break,
        }
    }
    parameters
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRequest(request) => f
                .debug_struct("CommandRequest")
                .field("code", &request.code)
                .field("transaction_id", &request.transaction_id)
                .field("arguments", &format!("{:08X?}", request.arguments))
                .field("data_out", &request.data_out)
                .finish(),
            Self::CommandResponse(response) => f
                .debug_struct("CommandResponse")
                .field("code", &response.code)
                .field("transaction_id", &response.transaction_id)
                .field("parameters", &format!("{:08X?}", response.parameters))
                .field("awaiting_further_data", &response.awaiting_further_data)
                .finish(),
            Self::Event(event) => f
                .debug_struct("Event")
                .field("code", &format!("0x{:04X}", event.code))
                .field("transaction_id", &event.transaction_id)
                .field("parameters", &format!("{:08X?}", event.parameters))
                .finish(),
            Self::Data {
                transaction_id,
                payload,
            }
            | Self::EndData {
                transaction_id,
                payload,
            } => f
                .debug_struct(if self.kind() == PacketKind::Data { "Data" } else { "EndData" })
                .field("transaction_id", transaction_id)
                .field("payload_len", &payload.len())
                .finish(),
            Self::InitCommandRequest { guid, name } => f
                .debug_struct("InitCommandRequest")
                .field("guid", &hex::encode(guid))
                .field("name", name)
                .finish(),
            Self::InitCommandAck {
                session_id,
                guid,
                name,
            } => f
                .debug_struct("InitCommandAck")
                .field("session_id", session_id)
                .field("guid", &hex::encode(guid))
                .field("name", name)
                .finish(),
            Self::InitEventRequest { session_id } => f
                .debug_struct("InitEventRequest")
                .field("session_id", session_id)
                .finish(),
            Self::InitFail { reason } => f
                .debug_struct("InitFail")
                .field("reason", &format!("0x{:08X}", reason))
                .finish(),
            Self::StartData {
                transaction_id,
                total_length,
            } => f
                .debug_struct("StartData")
                .field("transaction_id", transaction_id)
                .field("total_length", total_length)
                .finish(),
            Self::Cancel { transaction_id } => f
                .debug_struct("Cancel")
                .field("transaction_id", transaction_id)
                .finish(),
            Self::InitEventAck => f.write_str("InitEventAck"),
            Self::Ping => f.write_str("Ping"),
            Self::Pong => f.write_str("Pong"),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transaction_id() {
            Some(transaction_id) => write!(f, "Packet[{:?}](txid={})", self.kind(), transaction_id),
            None => write!(f, "Packet[{:?}]", self.kind()),
        }
    }
}
