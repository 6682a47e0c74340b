//! PTP/IP session over a control and an event stream
//!
//! [`PtpIpClient`] performs the socket-level handshake, then hands both
//! transports to a single background task. That task owns the receive buffers,
//! the pending callbacks and the data containers; callers reach it through a
//! channel which doubles as the FIFO outbound queue.

use std::time::Duration;

use bytes::Bytes;
use ptpip_core::{
    constants::DEFAULT_RESPONSE_TIMEOUT, ClientIdentity, CommandResponse, EventPacket,
    OperationCode, Packet, PacketStream, Session, SessionState,
};
use ptpip_transport::Transport;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::{
    dispatch::{DataResult, Dispatcher},
    error::{Error, Result},
};

const EVENT_CAPACITY: usize = 64;
const REQUEST_CAPACITY: usize = 32;

/// Which of the two streams a packet travels on
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Channel {
    Control,
    Event,
}

enum Request {
    Command {
        packet: Packet,
        data: Option<Bytes>,
        response: oneshot::Sender<CommandResponse>,
        any_response: bool,
        inbound_data: Option<oneshot::Sender<DataResult>>,
    },
    Ping {
        pong: oneshot::Sender<()>,
    },
    /// The caller of this transaction gave up waiting
    Forget {
        transaction_id: u32,
    },
    #[cfg(test)]
    Pending {
        count: oneshot::Sender<usize>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a connected PTP/IP session
///
/// Cheap to clone; all clones talk to the same session.
#[derive(Clone)]
pub struct PtpIpClient {
    requests: mpsc::Sender<Request>,
    session: Session,
    events: broadcast::Sender<EventPacket>,
    disconnected: watch::Receiver<bool>,
    response_timeout: Duration,
}

impl PtpIpClient {
    /// Open both streams and run the init handshake.
    ///
    /// The control stream sends the init command request; the session id from
    /// the ack is then presented on the event stream.
    pub async fn connect(
        mut control: Box<dyn Transport>,
        mut event: Box<dyn Transport>,
        identity: &ClientIdentity,
    ) -> Result<Self> {
        let session = Session::new();
        session.begin_connect()?;

        info!("Connecting to {}...", control.remote_addr());

        let handshake = async {
            control.connect().await?;
            control.send(&identity.init_request().encode()).await?;
            session.init_requested()?;

            let mut control_stream = PacketStream::new();
            let connection_id = loop {
                match next_packet(control.as_mut(), &mut control_stream).await? {
                    Packet::InitCommandAck {
                        session_id, name, ..
                    } => {
                        debug!("Init ack from {:?} (session {})", name, session_id);
                        break session_id;
                    }
                    Packet::InitFail { reason } => return Err(Error::InitFailed(reason)),
                    other => debug!("Ignoring {} before init ack", other),
                }
            };
            session.init_acknowledged(connection_id)?;

            event.connect().await?;
            event
                .send(&Packet::InitEventRequest {
                    session_id: connection_id,
                }
                .encode())
                .await?;
            session.event_requested()?;

            let mut event_stream = PacketStream::new();
            loop {
                match next_packet(event.as_mut(), &mut event_stream).await? {
                    Packet::InitEventAck => break,
                    Packet::InitFail { reason } => return Err(Error::InitFailed(reason)),
                    other => debug!("Ignoring {} before event ack", other),
                }
            }
            session.event_acknowledged()?;

            Ok::<_, Error>((control_stream, event_stream))
        };

        let (control_stream, event_stream) = match timeout(DEFAULT_RESPONSE_TIMEOUT, handshake).await {
            Ok(Ok(streams)) => streams,
            Ok(Err(e)) => {
                session.close();
                let _ = control.disconnect().await;
                let _ = event.disconnect().await;
                return Err(e);
            }
            Err(_) => {
                session.close();
                let _ = control.disconnect().await;
                let _ = event.disconnect().await;
                return Err(Error::Timeout("init handshake"));
            }
        };

        info!("PTP/IP session open (connection {})", session.connection_id());

        let (requests, receiver) = mpsc::channel(REQUEST_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (disconnected_tx, disconnected) = watch::channel(false);

        let actor = Actor {
            requests: receiver,
            control,
            event,
            control_stream,
            event_stream,
            dispatcher: Dispatcher::new(events.clone()),
            session: session.clone(),
            disconnected: disconnected_tx,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            requests,
            session,
            events,
            disconnected,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    /// Set how long to wait for each command response
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        !*self.disconnected.borrow() && self.session.is_open()
    }

    /// Resolves to `true` once the session has gone away
    pub fn on_disconnect(&self) -> watch::Receiver<bool> {
        self.disconnected.clone()
    }

    /// Every event received on either stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventPacket> {
        self.events.subscribe()
    }

    pub fn next_transaction_id(&self) -> u32 {
        self.session.next_transaction_id()
    }

    /// Rewind the transaction counter; the next id is `value + 1`
    pub fn reset_transaction_id(&self, value: u32) {
        self.session.reset_transaction_id(value);
    }

    /// Send a command and wait for its response.
    ///
    /// Error response codes are returned as a normal response.
    pub async fn send_command(&self, code: OperationCode, arguments: &[u32]) -> Result<CommandResponse> {
        let packet = Packet::command(code, self.next_transaction_id(), arguments);
        self.submit(packet, None, false, None).await
    }

    /// Send a command whose response may carry no or another transaction id
    pub async fn send_command_any_response(
        &self,
        code: OperationCode,
        arguments: &[u32],
    ) -> Result<CommandResponse> {
        let packet = Packet::command(code, self.next_transaction_id(), arguments);
        self.submit(packet, None, true, None).await
    }

    /// Send a command followed by an outbound data phase
    pub async fn send_command_with_data(
        &self,
        code: OperationCode,
        arguments: &[u32],
        data: Bytes,
    ) -> Result<CommandResponse> {
        let packet = Packet::command_with_data(code, self.next_transaction_id(), arguments);
        self.submit(packet, Some(data), false, None).await
    }

    /// Send a command and collect its inbound data phase.
    ///
    /// Fails with [`Error::CommandFailed`] when the device answers with an error.
    pub async fn request_data(&self, code: OperationCode, arguments: &[u32]) -> Result<Bytes> {
        let transaction_id = self.next_transaction_id();
        let packet = Packet::command(code, transaction_id, arguments);
        let (data_tx, data_rx) = oneshot::channel();

        let response = self.submit(packet, None, false, Some(data_tx)).await?;
        if response.is_error() {
            return Err(Error::from_response(code, response.code));
        }

        match timeout(self.response_timeout, data_rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(failure))) => Err(Error::from_response(code, failure)),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.forget(transaction_id);
                Err(Error::Timeout("data phase"))
            }
        }
    }

    /// Round-trip a ping on the event stream
    pub async fn ping(&self) -> Result<()> {
        let (pong, received) = oneshot::channel();
        self.requests
            .send(Request::Ping { pong })
            .await
            .map_err(|_| Error::NotConnected)?;

        match timeout(self.response_timeout, received).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => Err(Error::Timeout("pong")),
        }
    }

    /// Close both streams and fail anything still pending
    pub async fn disconnect(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        if self.requests.send(Request::Disconnect { done }).await.is_err() {
            return Ok(());
        }
        let _ = finished.await;
        Ok(())
    }

    async fn submit(
        &self,
        packet: Packet,
        data: Option<Bytes>,
        any_response: bool,
        inbound_data: Option<oneshot::Sender<DataResult>>,
    ) -> Result<CommandResponse> {
        let (response, received) = oneshot::channel();
        let transaction_id = packet.transaction_id();
        trace!("Queueing {}", packet);

        self.requests
            .send(Request::Command {
                packet,
                data,
                response,
                any_response,
                inbound_data,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match timeout(self.response_timeout, received).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                if let Some(transaction_id) = transaction_id {
                    self.forget(transaction_id);
                }
                Err(Error::Timeout("command response"))
            }
        }
    }

    fn forget(&self, transaction_id: u32) {
        if self
            .requests
            .try_send(Request::Forget { transaction_id })
            .is_err()
        {
            debug!("Could not drop callbacks for transaction {}", transaction_id);
        }
    }

    /// Callbacks the session task still holds
    #[cfg(test)]
    async fn pending_callbacks(&self) -> Result<usize> {
        let (count, counted) = oneshot::channel();
        self.requests
            .send(Request::Pending { count })
            .await
            .map_err(|_| Error::NotConnected)?;
        counted.await.map_err(|_| Error::Disconnected)
    }
}

/// Read from `transport` until `stream` yields a packet
async fn next_packet(transport: &mut dyn Transport, stream: &mut PacketStream) -> Result<Packet> {
    loop {
        let bytes = transport.receive().await?;
        if let Some(packet) = stream.feed(&bytes).into_iter().next() {
            return Ok(packet);
        }
    }
}

enum Step {
    Request(Option<Request>),
    Received(Channel, ptpip_transport::Result<bytes::BytesMut>),
}

/// Owner of both transports and all per-session state
struct Actor {
    requests: mpsc::Receiver<Request>,
    control: Box<dyn Transport>,
    event: Box<dyn Transport>,
    control_stream: PacketStream,
    event_stream: PacketStream,
    dispatcher: Dispatcher,
    session: Session,
    disconnected: watch::Sender<bool>,
}

impl Actor {
    async fn run(mut self) {
        let mut done: Option<oneshot::Sender<()>> = None;

        loop {
            let step = tokio::select! {
                request = self.requests.recv() => Step::Request(request),
                received = self.control.receive() => Step::Received(Channel::Control, received),
                received = self.event.receive() => Step::Received(Channel::Event, received),
            };

            let outcome = match step {
                Step::Request(None) => {
                    debug!("All client handles dropped");
                    break;
                }
                Step::Request(Some(Request::Disconnect { done: reply })) => {
                    done = Some(reply);
                    break;
                }
                Step::Request(Some(request)) => self.handle_request(request).await,
                Step::Received(_, Err(ptpip_transport::Error::ReadTimeout)) => Ok(()),
                Step::Received(channel, Err(e)) => {
                    error!("{:?} stream failed: {}", channel, e);
                    Err(e.into())
                }
                Step::Received(channel, Ok(bytes)) => self.handle_bytes(channel, &bytes).await,
            };

            if let Err(e) = outcome {
                warn!("Tearing down session: {}", e);
                break;
            }
        }

        self.teardown().await;
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn handle_request(&mut self, request: Request) -> Result<()> {
        match request {
            Request::Command {
                packet,
                data,
                response,
                any_response,
                inbound_data,
            } => {
                let Some(transaction_id) = packet.transaction_id() else {
                    return Ok(());
                };

                self.dispatcher.expect_response(transaction_id, response, any_response);
                if let Some(inbound_data) = inbound_data {
                    self.dispatcher.expect_data(transaction_id, inbound_data);
                }

                self.write(Channel::Control, &packet).await?;
                if let Some(data) = data {
                    for packet in Packet::data_phase(transaction_id, data) {
                        self.write(Channel::Control, &packet).await?;
                    }
                }
            }
            Request::Ping { pong } => {
                self.dispatcher.expect_pong(pong);
                self.write(Channel::Event, &Packet::Ping).await?;
            }
            Request::Forget { transaction_id } => self.dispatcher.forget(transaction_id),
            #[cfg(test)]
            Request::Pending { count } => {
                let _ = count.send(self.dispatcher.pending());
            }
            Request::Disconnect { .. } => {}
        }
        Ok(())
    }

    async fn handle_bytes(&mut self, channel: Channel, bytes: &[u8]) -> Result<()> {
        let packets = match channel {
            Channel::Control => self.control_stream.feed(bytes),
            Channel::Event => self.event_stream.feed(bytes),
        };

        for packet in packets {
            trace!("{:?} <- {:?}", channel, packet);
            if let Some(reply) = self.dispatcher.dispatch(packet) {
                self.write(channel, &reply).await?;
            }
        }
        Ok(())
    }

    async fn write(&mut self, channel: Channel, packet: &Packet) -> Result<()> {
        trace!("{:?} -> {:?}", channel, packet);
        let encoded = packet.encode();
        match channel {
            Channel::Control => self.control.send(&encoded).await?,
            Channel::Event => self.event.send(&encoded).await?,
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        let _ = self.control.disconnect().await;
        let _ = self.event.disconnect().await;

        self.dispatcher.clear();
        self.control_stream.clear();
        self.event_stream.clear();
        self.requests.close();
        self.session.close();

        let _ = self.disconnected.send(true);
        info!("PTP/IP session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_device::{Behavior, FakeDevice};
    use ptpip_core::{ResponseCode, SessionState};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_connect_handshake() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        assert_eq!(client.state(), SessionState::SessionOpen);
        assert_eq!(client.session().connection_id(), FakeDevice::CONNECTION_ID);
        assert!(client.is_connected());

        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_init_fail() {
        let device = FakeDevice::start_rejecting(0x2001).await;
        let result = device.client().await;

        assert!(matches!(result, Err(Error::InitFailed(0x2001))));
    }

    #[tokio::test]
    async fn test_transaction_ids_and_responses() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        let first = client.send_command(OperationCode::GetStorageIds, &[]).await.unwrap();
        let second = client.send_command(OperationCode::GetStorageIds, &[]).await.unwrap();

        assert_eq!(first.transaction_id, Some(0));
        assert_eq!(second.transaction_id, Some(2));
        assert_eq!(second.code, Some(ResponseCode::Okay));
    }

    #[tokio::test]
    async fn test_timed_out_command_releases_callbacks() {
        let device = FakeDevice::start_with(Behavior {
            unanswered: Some(OperationCode::GetDeviceInfo),
            ..Default::default()
        })
        .await;
        let client = device
            .client()
            .await
            .unwrap()
            .with_response_timeout(Duration::from_millis(100));

        let result = client.send_command(OperationCode::GetDeviceInfo, &[]).await;
        assert!(matches!(result, Err(Error::Timeout("command response"))));

        let result = client.request_data(OperationCode::GetDeviceInfo, &[]).await;
        assert!(matches!(result, Err(Error::Timeout("command response"))));
        assert_eq!(client.pending_callbacks().await.unwrap(), 0);

        let response = client.send_command(OperationCode::GetStorageIds, &[]).await.unwrap();
        assert_eq!(response.code, Some(ResponseCode::Okay));
    }

    #[tokio::test]
    async fn test_open_session_response_without_transaction_id() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        let response = client
            .send_command_any_response(OperationCode::OpenSession, &[1])
            .await
            .unwrap();

        assert_eq!(response.code, Some(ResponseCode::Okay));
        assert_eq!(response.transaction_id, None);
    }

    #[tokio::test]
    async fn test_request_data() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        let data = client
            .request_data(OperationCode::GetDeviceInfo, &[])
            .await
            .unwrap();
        assert_eq!(data, device.device_info_bytes());
    }

    #[tokio::test]
    async fn test_request_data_error_response() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        let result = client.request_data(OperationCode::GetObjectInfo, &[0x1234]).await;
        assert!(matches!(
            result,
            Err(Error::CommandFailed {
                operation: OperationCode::GetObjectInfo,
                code: Some(ResponseCode::InvalidObjectHandle),
            })
        ));
    }

    #[tokio::test]
    async fn test_send_command_with_data() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();

        let response = client
            .send_command_with_data(OperationCode::SetControlDeviceB, &[0xd2c1], Bytes::from_static(&[2, 0]))
            .await
            .unwrap();
        assert_eq!(response.code, Some(ResponseCode::Okay));

        let writes = device.property_writes();
        assert_eq!(writes, vec![(0xd2c1, vec![2, 0])]);
    }

    #[tokio::test]
    async fn test_ping() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_forwarded() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();
        let mut events = client.subscribe_events();

        device.emit_event(0xc203, &[0xd213]);

        let event = events.recv().await.unwrap();
        assert_eq!(event.code, 0xc203);
        assert_eq!(event.first_parameter(), Some(0xd213));
    }

    #[tokio::test]
    async fn test_device_close_fails_pending() {
        let device = FakeDevice::start().await;
        let client = device.client().await.unwrap();
        let mut disconnected = client.on_disconnect();

        device.hang_up();

        let result = client.send_command(OperationCode::GetStorageIds, &[0xdead]).await;
        assert!(matches!(result, Err(Error::Disconnected) | Err(Error::NotConnected)));

        disconnected.wait_for(|closed| *closed).await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
    }
}
