//! In-process PTP/IP camera for session tests
//!
//! Listens on `127.0.0.1:0` and speaks just enough of the protocol, through
//! the same codec the client uses, to drive the handshake, property and
//! capture flows.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use ptpip_core::{
    constants::sony::IN_MEMORY_OBJECT_ID, ByteBuffer, ClientIdentity, CommandRequest,
    CommandResponse, DataType, DeviceProperty, EventPacket, GetSetAvailable, GetSetSupported,
    OperationCode, Packet, PacketStream, PropertyCode, PropertyShape, PropertyValue, ResponseCode,
};
use ptpip_transport::TcpTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};

use crate::{client::PtpIpClient, error::Result};

/// What the device does once the shutter button goes down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutterScript {
    /// Object added as soon as the shutter is pressed
    ObjectOnPress,
    /// Focus found on press, object added on release
    FocusThenObjectOnRelease,
    /// No events; the in-memory property flips on release
    InMemoryOnRelease,
    /// Nothing at all
    Silent,
}

#[derive(Debug, Clone)]
pub(crate) struct Behavior {
    pub reject_init: Option<u32>,
    pub sony_extensions: bool,
    /// SdioConnect attempts to refuse with AnotherSessionOpen
    pub busy_sessions: usize,
    pub focus_mode: u16,
    pub shutter: ShutterScript,
    pub fail_capture: bool,
    /// Operation the device never answers
    pub unanswered: Option<OperationCode>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            reject_init: None,
            sony_extensions: true,
            busy_sessions: 0,
            focus_mode: 0x0002,
            shutter: ShutterScript::ObjectOnPress,
            fail_capture: false,
            unanswered: None,
        }
    }
}

#[derive(Default)]
struct State {
    behavior: Behavior,
    operations: Vec<(OperationCode, Vec<u32>, u32)>,
    writes: Vec<(u32, Vec<u8>)>,
    object_in_memory: u16,
}

pub(crate) struct FakeDevice {
    port: u16,
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<EventPacket>,
    hang_up: watch::Sender<bool>,
}

impl FakeDevice {
    pub const CONNECTION_ID: u32 = 0x2a;
    pub const FILE_NAME: &'static str = "DSC00001.JPG";
    pub const IMAGE: &'static [u8] = b"\xff\xd8not really a jpeg\xff\xd9";

    pub async fn start() -> Self {
        Self::start_with(Behavior::default()).await
    }

    pub async fn start_rejecting(reason: u32) -> Self {
        Self::start_with(Behavior {
            reject_init: Some(reason),
            ..Default::default()
        })
        .await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(Mutex::new(State {
            behavior,
            ..Default::default()
        }));
        let (events, _) = broadcast::channel(16);
        let (hang_up, hung_up) = watch::channel(false);

        tokio::spawn(accept_loop(listener, state.clone(), events.clone(), hung_up));

        Self {
            port,
            state,
            events,
            hang_up,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn client(&self) -> Result<PtpIpClient> {
        PtpIpClient::connect(
            Box::new(TcpTransport::new("127.0.0.1", self.port)),
            Box::new(TcpTransport::new("127.0.0.1", self.port)),
            &ClientIdentity::default(),
        )
        .await
    }

    /// Property code and data phase of every property write, in order
    pub fn property_writes(&self) -> Vec<(u32, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    /// Operation, arguments and transaction id of every command, in order
    pub fn operations(&self) -> Vec<(OperationCode, Vec<u32>, u32)> {
        self.state.lock().operations.clone()
    }

    pub fn emit_event(&self, code: u16, parameters: &[u32]) {
        let _ = self.events.send(event(code, parameters));
    }

    /// Close every open connection
    pub fn hang_up(&self) {
        let _ = self.hang_up.send(true);
    }

    pub fn device_info_bytes(&self) -> Bytes {
        device_info(&self.state.lock().behavior)
    }
}

fn event(code: u16, parameters: &[u32]) -> EventPacket {
    EventPacket {
        code,
        transaction_id: Some(0xffff_ffff),
        parameters: parameters.to_vec(),
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<EventPacket>,
    hung_up: watch::Receiver<bool>,
) {
    while let Ok((socket, _)) = listener.accept().await {
        tokio::spawn(handle_connection(
            Connection::new(socket),
            state.clone(),
            events.clone(),
            hung_up.clone(),
        ));
    }
}

struct Connection {
    socket: TcpStream,
    stream: PacketStream,
    queue: VecDeque<Packet>,
}

impl Connection {
    fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            stream: PacketStream::new(),
            queue: VecDeque::new(),
        }
    }

    async fn next(&mut self) -> Option<Packet> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Some(packet);
            }
            let mut buf = [0u8; 4096];
            let n = self.socket.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.queue.extend(self.stream.feed(&buf[..n]));
        }
    }

    async fn send(&mut self, packets: &[Packet]) -> Option<()> {
        for packet in packets {
            self.socket.write_all(&packet.encode()).await.ok()?;
        }
        Some(())
    }
}

async fn handle_connection(
    mut conn: Connection,
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<EventPacket>,
    hung_up: watch::Receiver<bool>,
) {
    match conn.next().await {
        Some(Packet::InitCommandRequest { .. }) => {
            let reject = state.lock().behavior.reject_init;
            if let Some(reason) = reject {
                let _ = conn.send(&[Packet::InitFail { reason }]).await;
                return;
            }
            let ack = Packet::InitCommandAck {
                session_id: FakeDevice::CONNECTION_ID,
                guid: [0x55; 16],
                name: Some("ILCE-7M3".into()),
            };
            if conn.send(&[ack]).await.is_some() {
                serve_control(conn, state, events, hung_up).await;
            }
        }
        Some(Packet::InitEventRequest { .. }) => {
            if conn.send(&[Packet::InitEventAck]).await.is_some() {
                serve_events(conn, events.subscribe(), hung_up).await;
            }
        }
        _ => {}
    }
}

async fn serve_control(
    mut conn: Connection,
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<EventPacket>,
    mut hung_up: watch::Receiver<bool>,
) {
    loop {
        if *hung_up.borrow() {
            return;
        }
        let packet = tokio::select! {
            packet = conn.next() => packet,
            _ = hung_up.changed() => return,
        };

        match packet {
            Some(Packet::CommandRequest(request)) => {
                let data = if request.data_out {
                    match collect_data(&mut conn).await {
                        Some(data) => Some(data),
                        None => return,
                    }
                } else {
                    None
                };
                let replies = handle_operation(&state, &events, &request, data);
                if conn.send(&replies).await.is_none() {
                    return;
                }
            }
            Some(Packet::Ping) => {
                if conn.send(&[Packet::Pong]).await.is_none() {
                    return;
                }
            }
            Some(_) => {}
            None => return,
        }
    }
}

async fn serve_events(
    mut conn: Connection,
    mut outgoing: broadcast::Receiver<EventPacket>,
    mut hung_up: watch::Receiver<bool>,
) {
    loop {
        if *hung_up.borrow() {
            return;
        }
        tokio::select! {
            packet = conn.next() => match packet {
                Some(Packet::Ping) => {
                    if conn.send(&[Packet::Pong]).await.is_none() {
                        return;
                    }
                }
                Some(_) => {}
                None => return,
            },
            event = outgoing.recv() => match event {
                Ok(event) => {
                    if conn.send(&[Packet::Event(event)]).await.is_none() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = hung_up.changed() => return,
        }
    }
}

async fn collect_data(conn: &mut Connection) -> Option<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        match conn.next().await? {
            Packet::StartData { .. } => {}
            Packet::Data { payload, .. } => data.extend_from_slice(&payload),
            Packet::EndData { payload, .. } => {
                data.extend_from_slice(&payload);
                return Some(data);
            }
            _ => {}
        }
    }
}

fn respond(code: ResponseCode, transaction_id: u32) -> Packet {
    Packet::CommandResponse(CommandResponse::new(code, transaction_id, vec![]))
}

fn with_data(transaction_id: u32, data: Bytes) -> Vec<Packet> {
    let mut packets = Packet::data_phase(transaction_id, data);
    packets.push(respond(ResponseCode::Okay, transaction_id));
    packets
}

fn handle_operation(
    state: &Mutex<State>,
    events: &broadcast::Sender<EventPacket>,
    request: &CommandRequest,
    data: Option<Vec<u8>>,
) -> Vec<Packet> {
    let transaction_id = request.transaction_id;
    let argument = request.arguments.first().copied().unwrap_or_default();
    let mut state = state.lock();
    state
        .operations
        .push((request.code, request.arguments.clone(), transaction_id));
    if state.behavior.unanswered == Some(request.code) {
        return vec![];
    }

    match request.code {
        OperationCode::OpenSession => vec![Packet::CommandResponse(CommandResponse {
            transaction_id: None,
            ..CommandResponse::new(ResponseCode::Okay, transaction_id, vec![])
        })],
        OperationCode::CloseSession | OperationCode::GetStorageIds => {
            vec![respond(ResponseCode::Okay, transaction_id)]
        }
        OperationCode::GetDeviceInfo => with_data(transaction_id, device_info(&state.behavior)),
        OperationCode::SdioConnect if state.behavior.sony_extensions => {
            if argument == 1 && state.behavior.busy_sessions > 0 {
                state.behavior.busy_sessions -= 1;
                vec![respond(ResponseCode::AnotherSessionOpen, transaction_id)]
            } else {
                vec![respond(ResponseCode::Okay, transaction_id)]
            }
        }
        OperationCode::SdioGetExtDeviceInfo if state.behavior.sony_extensions => {
            let mut buf = ByteBuffer::new();
            buf.append(0x012cu16);
            buf.append_array(&[0xd2c1, 0xd2c2]);
            with_data(transaction_id, buf.to_bytes())
        }
        OperationCode::GetAllDevicePropData => {
            let properties = properties(&state);
            let mut buf = ByteBuffer::new();
            buf.append(properties.len() as u64);
            for property in &properties {
                buf.append_bytes(&property.encode().to_vec());
            }
            with_data(transaction_id, buf.to_bytes())
        }
        OperationCode::GetDevicePropDesc => {
            match properties(&state)
                .into_iter()
                .find(|property| u32::from(u16::from(property.code)) == argument)
            {
                Some(property) => with_data(transaction_id, property.encode().to_bytes()),
                None => vec![respond(ResponseCode::DevicePropNotSupported, transaction_id)],
            }
        }
        OperationCode::SetControlDeviceA
        | OperationCode::SetControlDeviceB
        | OperationCode::SetDevicePropValue => {
            let data = data.unwrap_or_default();
            let pressed = data.first() == Some(&2);
            state.writes.push((argument, data));

            if argument == u32::from(u16::from(PropertyCode::Capture)) {
                if pressed && state.behavior.fail_capture {
                    return vec![respond(ResponseCode::GeneralError, transaction_id)];
                }
                match (state.behavior.shutter, pressed) {
                    (ShutterScript::ObjectOnPress, true) => {
                        let _ = events.send(event(0xc201, &[IN_MEMORY_OBJECT_ID]));
                    }
                    (ShutterScript::FocusThenObjectOnRelease, true) => {
                        let _ = events.send(event(0xc203, &[0xd213]));
                    }
                    (ShutterScript::FocusThenObjectOnRelease, false) => {
                        let _ = events.send(event(0xc201, &[IN_MEMORY_OBJECT_ID]));
                    }
                    (ShutterScript::InMemoryOnRelease, false) => state.object_in_memory = 0x8001,
                    _ => {}
                }
            }
            vec![respond(ResponseCode::Okay, transaction_id)]
        }
        OperationCode::GetObjectInfo if argument == IN_MEMORY_OBJECT_ID => {
            with_data(transaction_id, object_info())
        }
        OperationCode::GetPartialObject if argument == IN_MEMORY_OBJECT_ID => {
            let offset = request.arguments.get(1).copied().unwrap_or_default() as usize;
            let length = request.arguments.get(2).copied().unwrap_or_default() as usize;
            let end = offset.saturating_add(length).min(FakeDevice::IMAGE.len());
            let chunk = FakeDevice::IMAGE.get(offset..end).unwrap_or_default();
            with_data(transaction_id, Bytes::copy_from_slice(chunk))
        }
        OperationCode::GetObjectInfo | OperationCode::GetPartialObject => {
            vec![respond(ResponseCode::InvalidObjectHandle, transaction_id)]
        }
        _ => vec![respond(ResponseCode::OperationNotSupported, transaction_id)],
    }
}

fn device_info(behavior: &Behavior) -> Bytes {
    let mut operations = vec![
        0x1001, 0x1002, 0x1003, 0x1008, 0x1014, 0x1016, 0x101b, 0x9207, 0x9209,
    ];
    if behavior.sony_extensions {
        operations.extend([0x9201, 0x9202, 0x9205]);
    }

    let mut buf = ByteBuffer::new();
    buf.append(100u16);
    buf.append(0x11u32);
    buf.append(100u16);
    buf.append_wide_string("Sony PTP Extensions", true);
    buf.append(0u16);
    buf.append_array(&operations);
    buf.append_array(&[0xc201, 0xc203]);
    buf.append_array(&[0x5005, 0x500a, 0x500e, 0x5013, 0xd215, 0xd2c1, 0xd2c2]);
    buf.append_array(&[]);
    buf.append_array(&[0x3801]);
    buf.append_wide_string("Sony Corporation", true);
    buf.append_wide_string("ILCE-7M3", true);
    buf.append_wide_string("3.01", true);
    buf.append_wide_string("00000000123", true);
    buf.to_bytes()
}

fn object_info() -> Bytes {
    let mut buf = ByteBuffer::new();
    buf.append(0x0001_0001u32);
    buf.append(0x3801u16);
    buf.append(0u16);
    buf.append(FakeDevice::IMAGE.len() as u32);
    buf.append(0x3808u16);
    buf.append(0u32);
    buf.append(0u32);
    buf.append(0u32);
    buf.append(6000u32);
    buf.append(4000u32);
    buf.append(24u32);
    buf.append(0u32);
    buf.append(0u16);
    buf.append(0u32);
    buf.append(0u32);
    buf.append_wide_string(FakeDevice::FILE_NAME, true);
    buf.append_wide_string("20240501T101500", true);
    buf.append_wide_string("20240501T101500", true);
    buf.append(0u8);
    buf.to_bytes()
}

fn plain(code: PropertyCode, data_type: DataType, value: PropertyValue) -> DeviceProperty {
    DeviceProperty {
        code,
        data_type,
        get_set_supported: GetSetSupported::GetSet,
        get_set_available: GetSetAvailable::GetSet,
        factory_value: value.clone(),
        current_value: value,
        shape: PropertyShape::Other,
        length: 0,
    }
}

fn properties(state: &State) -> Vec<DeviceProperty> {
    let focus_modes = [0x0001, 0x0002, 0x8004]
        .into_iter()
        .map(PropertyValue::UInt16)
        .collect::<Vec<_>>();

    vec![
        DeviceProperty {
            shape: PropertyShape::Enum {
                available: focus_modes.clone(),
                supported: focus_modes,
            },
            ..plain(
                PropertyCode::FocusMode,
                DataType::UInt16,
                PropertyValue::UInt16(state.behavior.focus_mode),
            )
        },
        plain(
            PropertyCode::ExposureProgramMode,
            DataType::UInt32,
            PropertyValue::UInt32(0x0001_0002),
        ),
        plain(PropertyCode::StillCaptureMode, DataType::UInt32, PropertyValue::UInt32(0x0001)),
        DeviceProperty {
            get_set_supported: GetSetSupported::Get,
            get_set_available: GetSetAvailable::Get,
            ..plain(
                PropertyCode::ObjectInMemory,
                DataType::UInt16,
                PropertyValue::UInt16(state.object_in_memory),
            )
        },
        plain(PropertyCode::WhiteBalance, DataType::UInt16, PropertyValue::UInt16(0x0002)),
    ]
}
