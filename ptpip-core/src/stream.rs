//! Incremental packet parsing over a growing receive buffer

use tracing::{trace, warn};

use crate::{
    buffer::ByteBuffer,
    packet::{CommandResponse, Header, Packet, PacketKind},
};

/// Outcome of looking for a packet at one offset
enum Step {
    /// Not enough bytes for the next packet yet
    NeedMore,
    /// Nothing valid starts here, try one byte later
    Resync,
    /// A packet and the number of bytes it consumed
    Parsed(Packet, usize),
    /// A command response whose declared length has not arrived yet
    Truncated(CommandResponse),
}

/// Receive-side framer for one stream.
///
/// Bytes are fed in as they arrive; each call returns every packet that can be
/// decoded so far and drops the bytes those packets used.
///
/// # Examples
///
/// ```
/// use ptpip_core::{Packet, PacketStream};
///
/// let mut stream = PacketStream::new();
/// let mut bytes = Packet::Ping.encode().to_vec();
/// bytes.extend_from_slice(&[0x08, 0x00]);
///
/// let packets = stream.feed(&bytes);
/// assert_eq!(packets, vec![Packet::Ping]);
/// assert_eq!(stream.buffered(), 2);
/// ```
#[derive(Debug, Default)]
pub struct PacketStream {
    buffer: ByteBuffer,
    held: Option<CommandResponse>,
}

impl PacketStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a truncated command response is waiting for more bytes
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Drop all buffered bytes and any held response
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.held = None;
    }

    /// Append newly received bytes and parse as many packets as possible
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Packet> {
        self.buffer.append_bytes(bytes);

        let mut packets = Vec::new();
        if let Some(held) = self.held.take() {
            match self.complete_held(held) {
                Some(packet) => packets.push(packet),
                None => return packets,
            }
        }
        packets.extend(self.parse_pass());
        packets
    }

    /// Rebuild a held response from its header and the bytes received since.
    ///
    /// The response stays held until its declared length has arrived or the
    /// buffer starts with another packet. A complete response consumes its
    /// bytes; otherwise the held response is released as-is.
    fn complete_held(&mut self, held: CommandResponse) -> Option<Packet> {
        let length = held.declared_length.max(14);
        let missing = length as usize - Packet::HEADER_SIZE;

        if self.buffer.len() < missing {
            if !starts_packet(&self.buffer) {
                trace!("Holding command response, {} of {} bytes", self.buffer.len(), missing);
                self.held = Some(held);
                return None;
            }
        } else {
            let mut merged = ByteBuffer::with_capacity(Packet::HEADER_SIZE + self.buffer.len());
            merged.append(length);
            merged.append(u32::from(PacketKind::CommandResponse));
            merged.append_bytes(&self.buffer.to_vec());

            if let Step::Parsed(Packet::CommandResponse(response), consumed) = parse_at(&merged, 0) {
                if response.code.is_some() {
                    trace!("Completed held response with {} more bytes", consumed - Packet::HEADER_SIZE);
                    self.buffer.advance(consumed - Packet::HEADER_SIZE);
                    return Some(Packet::CommandResponse(response));
                }
            }
        }

        warn!("Releasing incomplete command response (declared length {})", held.declared_length);
        Some(Packet::CommandResponse(CommandResponse {
            awaiting_further_data: false,
            ..held
        }))
    }

    fn parse_pass(&mut self) -> Vec<Packet> {
        let mut offset = 0;
        let mut packets = Vec::new();

        while offset < self.buffer.len() {
            match parse_at(&self.buffer, offset) {
                Step::NeedMore => break,
                Step::Resync => offset += 1,
                Step::Parsed(packet, consumed) => {
                    trace!("Parsed {} ({} bytes)", packet, consumed);
                    offset += consumed;
                    packets.push(packet);
                }
                Step::Truncated(response) => {
                    offset += Packet::HEADER_SIZE;
                    self.held = Some(response.clone());
                    packets.push(Packet::CommandResponse(response));
                    break;
                }
            }
        }

        if offset > 0 {
            self.buffer.advance(offset);
        }
        packets
    }
}

/// The buffer begins with a readable header of a plausible length
fn starts_packet(buf: &ByteBuffer) -> bool {
    buf.len() >= Packet::HEADER_SIZE
        && Header::read(buf, 0).is_ok_and(|header| header.length as usize >= Packet::HEADER_SIZE)
}

fn parse_at(buf: &ByteBuffer, offset: usize) -> Step {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < Packet::HEADER_SIZE {
        return Step::NeedMore;
    }

    let header = match Header::read(buf, offset) {
        Ok(header) => header,
        Err(_) => return Step::Resync,
    };

    let length = header.length as usize;
    if header.kind == PacketKind::CommandResponse {
        return parse_command_response(buf, offset, header, remaining);
    }

    if length < Packet::HEADER_SIZE {
        return Step::Resync;
    }
    if remaining < length {
        return Step::NeedMore;
    }

    let payload = buf.sliced(offset + Packet::HEADER_SIZE, Some(offset + length));
    match Packet::decode_payload(header.kind, &payload) {
        Ok(packet) => Step::Parsed(packet, length),
        Err(e) => {
            warn!("Skipping undecodable {:?} packet: {}", header.kind, e);
            Step::Resync
        }
    }
}

/// Command responses never consume more than their header unless fully decodable
fn parse_command_response(buf: &ByteBuffer, offset: usize, header: Header, remaining: usize) -> Step {
    let length = header.length as usize;

    if remaining < length {
        return Step::Truncated(CommandResponse::malformed(header.length));
    }

    let payload = buf.sliced(offset + Packet::HEADER_SIZE, Some(offset + length));
    match Packet::decode_payload(PacketKind::CommandResponse, &payload) {
        Ok(packet) => Step::Parsed(packet, length.max(Packet::HEADER_SIZE)),
        Err(e) => {
            trace!("Malformed command response at offset {}: {}", offset, e);
            Step::Parsed(
                Packet::CommandResponse(CommandResponse::malformed(header.length)),
                Packet::HEADER_SIZE,
            )
        }
    }
}
