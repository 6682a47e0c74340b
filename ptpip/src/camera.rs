//! High-level camera interface

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use ptpip_core::{
    constants::{self, sony},
    ByteBuffer, ClientIdentity, Dataset, DeviceProperty, EventPacket, OperationCode, PropertyCode,
    PropertyValue, ResponseCode, SetPropertyValue,
};
use ptpip_transport::TcpTransport;
use ptpip_types::{DeviceInfo, FocusMode, Manufacturer, ObjectInfo, ShootingMode};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    capture::{self, CaptureOutcome, CaptureSink, CaptureState, Signal},
    client::PtpIpClient,
    error::{Error, Result},
};

/// Connection and capture settings for a [`Camera`]
#[derive(Debug, Clone)]
pub struct CameraConfig {
    host: String,
    port: u16,
    identity: ClientIdentity,
    manufacturer: Option<Manufacturer>,
    connect_attempts: usize,
    connect_timeout: Duration,
    response_timeout: Duration,
    focus_timeout: Duration,
    object_timeout: Duration,
    poll_interval: Duration,
}

impl CameraConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: constants::DEFAULT_PORT,
            identity: ClientIdentity::default(),
            manufacturer: None,
            connect_attempts: constants::CONNECT_ATTEMPTS,
            connect_timeout: constants::DEFAULT_CONNECT_TIMEOUT,
            response_timeout: constants::DEFAULT_RESPONSE_TIMEOUT,
            focus_timeout: constants::capture::FOCUS_TIMEOUT,
            object_timeout: constants::capture::OBJECT_TIMEOUT,
            poll_interval: constants::capture::POLL_INTERVAL,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Force the property tables of `manufacturer` instead of detecting it
    /// from the device info
    pub fn with_manufacturer(mut self, manufacturer: Manufacturer) -> Self {
        self.manufacturer = Some(manufacturer);
        self
    }

    pub fn with_connect_attempts(mut self, attempts: usize) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_focus_timeout(mut self, timeout: Duration) -> Self {
        self.focus_timeout = timeout;
        self
    }

    pub fn with_object_timeout(mut self, timeout: Duration) -> Self {
        self.object_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn transport(&self) -> TcpTransport {
        TcpTransport::new(self.host.clone(), self.port).with_connect_timeout(self.connect_timeout)
    }
}

/// Connected camera
///
/// Cheap to clone; clones share the session, the property cache and the
/// capture state.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ptpip::{Camera, CameraConfig, MemorySink};
///
/// #[tokio::main]
/// async fn main() -> ptpip::Result<()> {
///     let sink = Arc::new(MemorySink::new());
///     let camera = Camera::connect(CameraConfig::new("192.168.122.1"), sink.clone()).await?;
///
///     println!("{}", camera.device_info());
///     let outcome = camera.take_picture().await?;
///     println!("{:?}, {} image(s) stored", outcome, sink.len());
///
///     camera.disconnect().await
/// }
/// ```
#[derive(Clone)]
pub struct Camera {
    inner: Arc<Inner>,
}

struct Inner {
    config: CameraConfig,
    client: PtpIpClient,
    device_info: DeviceInfo,
    manufacturer: Manufacturer,
    properties: RwLock<HashMap<PropertyCode, DeviceProperty>>,
    sink: Arc<dyn CaptureSink>,
    capture_state: RwLock<CaptureState>,
    awaiting_object: AtomicBool,
    captured_object: Mutex<Option<u32>>,
    continuous: Mutex<Option<broadcast::Receiver<EventPacket>>>,
    last_event: RwLock<Option<EventPacket>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Everything the handshake learned about the device
struct Handshake {
    client: PtpIpClient,
    device_info: DeviceInfo,
    manufacturer: Manufacturer,
    properties: Vec<DeviceProperty>,
}

impl Camera {
    /// Connect, open a session and run the vendor handshake.
    ///
    /// The whole sequence is retried when another client holds the camera or
    /// the device refuses an operation of the handshake.
    pub async fn connect(config: CameraConfig, sink: Arc<dyn CaptureSink>) -> Result<Self> {
        let mut attempt = 1;
        let handshake = loop {
            match Self::handshake(&config).await {
                Ok(handshake) => break handshake,
                Err(e) if e.is_retryable_connect() && attempt < config.connect_attempts => {
                    warn!(
                        "Connect attempt {}/{} failed: {}",
                        attempt, config.connect_attempts, e
                    );
                    attempt += 1;
                    sleep(config.poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        };

        let properties = handshake
            .properties
            .into_iter()
            .map(|property| (property.code, property))
            .collect();

        let events = handshake.client.subscribe_events();
        let inner = Arc::new(Inner {
            config,
            client: handshake.client,
            device_info: handshake.device_info,
            manufacturer: handshake.manufacturer,
            properties: RwLock::new(properties),
            sink,
            capture_state: RwLock::new(CaptureState::Idle),
            awaiting_object: AtomicBool::new(false),
            captured_object: Mutex::new(None),
            continuous: Mutex::new(None),
            last_event: RwLock::new(None),
            pump: Mutex::new(None),
        });

        let pump = tokio::spawn(event_pump(Arc::downgrade(&inner), events));
        *inner.pump.lock() = Some(pump);

        info!(
            "Camera ready: {} ({} properties cached)",
            inner.device_info.model.as_deref().unwrap_or("unknown model"),
            inner.properties.read().len()
        );

        Ok(Self { inner })
    }

    async fn handshake(config: &CameraConfig) -> Result<Handshake> {
        let client = PtpIpClient::connect(
            Box::new(config.transport()),
            Box::new(config.transport()),
            &config.identity,
        )
        .await?
        .with_response_timeout(config.response_timeout);

        match Self::open_session(config, &client).await {
            Ok((device_info, manufacturer, properties)) => Ok(Handshake {
                client,
                device_info,
                manufacturer,
                properties,
            }),
            Err(e) => {
                let _ = client.disconnect().await;
                Err(e)
            }
        }
    }

    async fn open_session(
        config: &CameraConfig,
        client: &PtpIpClient,
    ) -> Result<(DeviceInfo, Manufacturer, Vec<DeviceProperty>)> {
        let response = client
            .send_command_any_response(OperationCode::OpenSession, &[constants::SESSION_ID])
            .await?;
        match response.code {
            Some(ResponseCode::SessionAlreadyOpened) => debug!("Session was already open"),
            code if response.is_error() => {
                return Err(Error::from_response(OperationCode::OpenSession, code));
            }
            _ => {}
        }

        let data = client.request_data(OperationCode::GetDeviceInfo, &[]).await?;
        let device_info = DeviceInfo::decode(&ByteBuffer::from(data.as_ref()))?;
        debug!("{}", device_info);

        let manufacturer = config
            .manufacturer
            .or_else(|| {
                device_info
                    .manufacturer
                    .as_deref()
                    .and_then(Manufacturer::from_device_string)
            })
            .unwrap_or_default();

        if device_info.supports_operation(OperationCode::SdioGetExtDeviceInfo.into()) {
            client.session().begin_vendor_handshake()?;
            Self::sdio_handshake(client).await?;
        }

        let properties = if device_info.supports_operation(OperationCode::GetAllDevicePropData.into()) {
            let data = client
                .request_data(OperationCode::GetAllDevicePropData, &[0])
                .await?;
            DeviceProperty::decode_all(&ByteBuffer::from(data.as_ref()))?
        } else {
            Vec::new()
        };

        client.session().mark_ready()?;
        Ok((device_info, manufacturer, properties))
    }

    async fn sdio_handshake(client: &PtpIpClient) -> Result<()> {
        for phase in [1, 2] {
            Self::sdio_connect(client, phase).await?;
        }

        client
            .request_data(
                OperationCode::SdioGetExtDeviceInfo,
                &[sony::EXT_DEVICE_INFO_VERSION],
            )
            .await?;

        client.reset_transaction_id(1);

        if let Err(e) = Self::sdio_connect(client, 3).await {
            debug!("SDIO connect phase 3 ignored: {}", e);
        }
        Ok(())
    }

    async fn sdio_connect(client: &PtpIpClient, phase: u32) -> Result<()> {
        debug!("SDIO connect phase {}", phase);
        let response = client
            .send_command(OperationCode::SdioConnect, &[phase, 0, 0])
            .await?;

        match response.code {
            Some(ResponseCode::AnotherSessionOpen) => {
                warn!("Another client has a session open on this camera");
                if let Err(e) = client.send_command(OperationCode::CloseSession, &[]).await {
                    debug!("CloseSession failed: {}", e);
                }
                Err(Error::AnotherSessionOpen)
            }
            code if response.is_error() => Err(Error::from_response(OperationCode::SdioConnect, code)),
            _ => Ok(()),
        }
    }

    /// Close the session and stop the event pump
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        self.reset_capture();

        if self.inner.client.is_connected() {
            if let Err(e) = self
                .inner
                .client
                .send_command(OperationCode::CloseSession, &[])
                .await
            {
                warn!("Failed to send CloseSession: {}", e);
            }
        }

        self.inner.client.disconnect().await?;
        info!("Camera disconnected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.client.is_connected()
    }

    pub fn client(&self) -> &PtpIpClient {
        &self.inner.client
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.inner.device_info
    }

    pub fn manufacturer(&self) -> Manufacturer {
        self.inner.manufacturer
    }

    pub fn capture_state(&self) -> CaptureState {
        *self.inner.capture_state.read()
    }

    /// Most recent event seen on the session
    pub fn last_event(&self) -> Option<EventPacket> {
        self.inner.last_event.read().clone()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Last known state of a property
    pub fn cached_property(&self, code: PropertyCode) -> Option<DeviceProperty> {
        self.inner.properties.read().get(&code).cloned()
    }

    /// Current value of a cached property
    pub fn cached_value(&self, code: PropertyCode) -> Option<PropertyValue> {
        self.inner
            .properties
            .read()
            .get(&code)
            .map(|property| property.current_value.clone())
    }

    /// Fetch one property descriptor and cache it
    pub async fn get_device_prop_desc(&self, code: PropertyCode) -> Result<DeviceProperty> {
        let data = self
            .inner
            .client
            .request_data(OperationCode::GetDevicePropDesc, &[u32::from(u16::from(code))])
            .await?;

        let property = DeviceProperty::decode(&ByteBuffer::from(data.as_ref()), 0)?;
        trace!("{} = {:?}", property.code, property.current_value);

        self.inner
            .properties
            .write()
            .insert(property.code, property.clone());
        Ok(property)
    }

    /// Fetch every property, or with `partial` only those changed since the
    /// last fetch, and merge them into the cache
    pub async fn get_all_device_prop_data(&self, partial: bool) -> Result<Vec<DeviceProperty>> {
        let data = self
            .inner
            .client
            .request_data(OperationCode::GetAllDevicePropData, &[u32::from(partial)])
            .await?;
        let properties = DeviceProperty::decode_all(&ByteBuffer::from(data.as_ref()))?;

        debug!("Fetched {} properties (partial: {})", properties.len(), partial);

        let mut cache = self.inner.properties.write();
        for property in &properties {
            cache.insert(property.code, property.clone());
        }
        Ok(properties)
    }

    /// Refresh the cache with whatever changed on the device
    pub async fn refresh_properties(&self) -> Result<()> {
        if self.supports(OperationCode::GetAllDevicePropData) {
            self.get_all_device_prop_data(true).await?;
        }
        Ok(())
    }

    /// Standard property write
    pub async fn set_device_prop_value(&self, code: PropertyCode, value: i64) -> Result<()> {
        self.write_property(OperationCode::SetDevicePropValue, code, value)
            .await
    }

    /// Sony property write for settings
    pub async fn set_control_device_a(&self, code: PropertyCode, value: i64) -> Result<()> {
        self.write_property(OperationCode::SetControlDeviceA, code, value)
            .await
    }

    /// Sony property write for buttons
    pub async fn set_control_device_b(&self, code: PropertyCode, value: i64) -> Result<()> {
        self.write_property(OperationCode::SetControlDeviceB, code, value)
            .await
    }

    async fn write_property(&self, operation: OperationCode, code: PropertyCode, value: i64) -> Result<()> {
        let write = SetPropertyValue::new(code, value, self.inner.manufacturer)?;
        debug!("{} {} = {}", operation, code, value);

        let response = self
            .inner
            .client
            .send_command_with_data(operation, &[write.argument()], write.data())
            .await?;

        if response.is_error() {
            return Err(Error::from_response(operation, response.code));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub async fn get_object_info(&self, handle: u32) -> Result<ObjectInfo> {
        let data = self
            .inner
            .client
            .request_data(OperationCode::GetObjectInfo, &[handle])
            .await
            .map_err(object_not_found)?;

        Ok(ObjectInfo::decode(&ByteBuffer::from(data.as_ref()))?)
    }

    /// Read `length` bytes of an object starting at `offset`
    pub async fn get_partial_object(&self, handle: u32, offset: u32, length: u32) -> Result<Bytes> {
        self.inner
            .client
            .request_data(OperationCode::GetPartialObject, &[handle, offset, length])
            .await
            .map_err(object_not_found)
    }

    /// Fetch an object and hand it to the sink
    pub async fn download(&self, handle: u32) -> Result<()> {
        let info = self.get_object_info(handle).await?;
        let data = self
            .get_partial_object(handle, 0, info.compressed_size)
            .await?;

        let mode = self.shooting_mode();
        let file_name = info.file_name_or(handle);
        info!("Downloaded {} ({} bytes, {})", file_name, data.len(), mode);

        self.inner.sink.store(mode, &file_name, data);
        Ok(())
    }

    /// Shooting mode according to the cached exposure and drive settings
    pub fn shooting_mode(&self) -> ShootingMode {
        let value = |code| {
            self.cached_value(code)
                .and_then(|value| value.as_i64())
                .and_then(|raw| u32::try_from(raw).ok())
        };
        ShootingMode::from_sony(
            value(PropertyCode::ExposureProgramMode),
            value(PropertyCode::StillCaptureMode),
        )
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Focus, release the shutter and download the resulting image.
    ///
    /// Waiting for the object is bounded; if the device never reports one the
    /// outcome carries no object id. A failed download is logged and reported
    /// through [`CaptureOutcome::downloaded`].
    ///
    /// Dropping the returned future abandons the capture: the shutter is
    /// released in the background and the camera accepts a new capture once
    /// that release has been sent.
    pub async fn take_picture(&self) -> Result<CaptureOutcome> {
        let (guard, mut events) = self.begin_capture()?;

        let result = self.run_capture(&mut events).await;
        guard.settle(result.is_ok());
        result
    }

    async fn run_capture(&self, events: &mut broadcast::Receiver<EventPacket>) -> Result<CaptureOutcome> {
        self.press_shutter().await?;

        let focused = self.await_focus(events).await;
        self.release_shutter().await;

        self.finish_object(events, focused?).await
    }

    /// Wait for focus when autofocus is on; an object seen meanwhile is returned
    async fn await_focus(&self, events: &mut broadcast::Receiver<EventPacket>) -> Result<Option<u32>> {
        if !self.auto_focus_active().await {
            return Ok(None);
        }

        self.set_capture_state(CaptureState::AwaitingFocus);
        let mut disconnected = self.inner.client.on_disconnect();
        let signal = capture::wait_for_focus(
            events,
            &self.inner.captured_object,
            &mut disconnected,
            self.inner.config.focus_timeout,
            self.inner.config.poll_interval,
        )
        .await?;

        match signal {
            Some(Signal::ObjectAdded(id)) => return Ok(Some(id)),
            Some(Signal::Focused) => debug!("Focus found"),
            None => debug!("No focus confirmation, continuing"),
        }
        Ok(None)
    }

    /// Press the shutter and keep it down until [`finish_capturing`](Self::finish_capturing)
    pub async fn start_capturing(&self) -> Result<()> {
        let (guard, events) = self.begin_capture()?;

        if let Err(e) = self.press_shutter().await {
            guard.settle(false);
            return Err(e);
        }

        *self.inner.continuous.lock() = Some(events);
        guard.keep();
        Ok(())
    }

    /// Release the shutter pressed by [`start_capturing`](Self::start_capturing),
    /// optionally waiting for and downloading the last object
    pub async fn finish_capturing(&self, await_object_id: bool) -> Result<CaptureOutcome> {
        let Some(mut events) = self.inner.continuous.lock().take() else {
            return Err(Error::InvalidResponse("no continuous capture in progress".into()));
        };
        let guard = CaptureGuard::new(self);

        self.release_shutter().await;

        let result = if await_object_id {
            self.finish_object(&mut events, None).await
        } else {
            Ok(CaptureOutcome::default())
        };
        guard.settle(result.is_ok());
        result
    }

    fn begin_capture(&self) -> Result<(CaptureGuard, broadcast::Receiver<EventPacket>)> {
        {
            let mut state = self.inner.capture_state.write();
            if !state.is_settled() {
                return Err(Error::CaptureInProgress);
            }
            *state = CaptureState::Capturing;
        }

        *self.inner.captured_object.lock() = None;
        self.inner.awaiting_object.store(true, Ordering::Release);
        debug!("Capture started");
        Ok((CaptureGuard::new(self), self.inner.client.subscribe_events()))
    }

    fn end_capture(&self, succeeded: bool) {
        if !self.inner.client.is_connected() {
            self.reset_capture();
            return;
        }

        self.inner.awaiting_object.store(false, Ordering::Release);
        *self.inner.captured_object.lock() = None;
        self.set_capture_state(if succeeded {
            CaptureState::Idle
        } else {
            CaptureState::Error
        });
    }

    fn reset_capture(&self) {
        self.inner.continuous.lock().take();
        self.inner.awaiting_object.store(false, Ordering::Release);
        *self.inner.captured_object.lock() = None;
        self.set_capture_state(CaptureState::Idle);
    }

    fn set_capture_state(&self, state: CaptureState) {
        trace!("Capture state: {}", state);
        *self.inner.capture_state.write() = state;
    }

    /// Autofocus down, then shutter down; releases both on failure
    async fn press_shutter(&self) -> Result<()> {
        let pressed = async {
            self.set_control_device_b(PropertyCode::AutoFocus, i64::from(sony::BUTTON_DOWN))
                .await?;
            self.set_control_device_b(PropertyCode::Capture, i64::from(sony::BUTTON_DOWN))
                .await
        }
        .await;

        if let Err(e) = &pressed {
            warn!("Shutter press failed: {}", e);
            self.release_shutter().await;
        }
        pressed
    }

    /// Shutter up, then autofocus up. Failures are only logged.
    async fn release_shutter(&self) {
        if !self.inner.client.is_connected() {
            debug!("Session closed, shutter left to the device");
            return;
        }
        for code in [PropertyCode::Capture, PropertyCode::AutoFocus] {
            if let Err(e) = self.set_control_device_b(code, i64::from(sony::BUTTON_UP)).await {
                warn!("Failed to release {}: {}", code, e);
            }
        }
    }

    async fn auto_focus_active(&self) -> bool {
        let raw = match self.cached_value(PropertyCode::FocusMode) {
            Some(value) => value.as_i64(),
            None => match self.get_device_prop_desc(PropertyCode::FocusMode).await {
                Ok(property) => property.current_value.as_i64(),
                Err(e) => {
                    debug!("Focus mode unknown ({}), assuming autofocus", e);
                    return true;
                }
            },
        };

        match raw.and_then(|raw| u16::try_from(raw).ok()) {
            Some(raw) => FocusMode::from_raw(self.inner.manufacturer, raw).is_auto_focus(),
            None => true,
        }
    }

    /// Wait for the object if needed, then download it
    async fn finish_object(
        &self,
        events: &mut broadcast::Receiver<EventPacket>,
        object_id: Option<u32>,
    ) -> Result<CaptureOutcome> {
        let object_id = match object_id {
            Some(id) => Some(id),
            None => {
                self.set_capture_state(CaptureState::AwaitingObject);
                self.wait_for_object(events).await?
            }
        };

        let Some(object_id) = object_id else {
            warn!(
                "No object reported within {:?}",
                self.inner.config.object_timeout
            );
            return Ok(CaptureOutcome::default());
        };

        self.set_capture_state(CaptureState::Downloading);
        let downloaded = match self.download(object_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Captured object 0x{:08X} not downloaded: {}", object_id, e);
                false
            }
        };

        Ok(CaptureOutcome {
            object_id: Some(object_id),
            downloaded,
        })
    }

    async fn wait_for_object(&self, events: &mut broadcast::Receiver<EventPacket>) -> Result<Option<u32>> {
        let mut disconnected = self.inner.client.on_disconnect();
        let until = Instant::now() + self.inner.config.object_timeout;
        loop {
            if let Some(object_id) = capture::next_object(events)? {
                return Ok(Some(object_id));
            }
            if let Some(object_id) = self.inner.captured_object.lock().take() {
                return Ok(Some(object_id));
            }
            if self.object_in_memory().await {
                return Ok(Some(sony::IN_MEMORY_OBJECT_ID));
            }
            if Instant::now() >= until {
                return Ok(None);
            }
            capture::tick(&mut disconnected, self.inner.config.poll_interval).await?;
        }
    }

    /// Sony signals a buffered image through a property instead of an event
    async fn object_in_memory(&self) -> bool {
        if self.inner.manufacturer != Manufacturer::Sony {
            return false;
        }

        match self.get_device_prop_desc(PropertyCode::ObjectInMemory).await {
            Ok(property) => property
                .current_value
                .as_i64()
                .is_some_and(|value| value >= i64::from(sony::OBJECT_IN_MEMORY_THRESHOLD)),
            Err(e) => {
                debug!("Object-in-memory poll failed: {}", e);
                false
            }
        }
    }

    fn supports(&self, operation: OperationCode) -> bool {
        self.inner.device_info.supports_operation(operation.into())
    }

    async fn on_event(&self, event: EventPacket) {
        *self.inner.last_event.write() = Some(event.clone());

        let Some(code) = event.event_code() else {
            trace!("Unknown event 0x{:04X}", event.code);
            return;
        };

        if code.is_object_added() {
            let Some(object_id) = event.first_parameter() else {
                return;
            };
            if self.inner.awaiting_object.load(Ordering::Acquire) {
                debug!("Object 0x{:08X} added during capture", object_id);
                *self.inner.captured_object.lock() = Some(object_id);
            } else if let Err(e) = self.download(object_id).await {
                warn!("Failed to download object 0x{:08X}: {}", object_id, e);
            }
        } else if code.is_property_changed() {
            if let Err(e) = self.refresh_properties().await {
                debug!("Property refresh failed: {}", e);
            }
        } else {
            trace!("Event {}", code);
        }
    }
}

/// Settles the capture state when a capture ends.
///
/// A guard dropped without [`settle`](Self::settle) or [`keep`](Self::keep)
/// belongs to an abandoned capture: the shutter is released on a spawned task
/// and the state only settles once that release is done.
struct CaptureGuard {
    camera: Option<Camera>,
}

impl CaptureGuard {
    fn new(camera: &Camera) -> Self {
        Self {
            camera: Some(camera.clone()),
        }
    }

    fn settle(mut self, succeeded: bool) {
        if let Some(camera) = self.camera.take() {
            camera.end_capture(succeeded);
        }
    }

    /// Leave the capture running past this call
    fn keep(mut self) {
        self.camera = None;
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let Some(camera) = self.camera.take() else {
            return;
        };

        warn!("Capture abandoned in state {}", camera.capture_state());
        camera.inner.awaiting_object.store(false, Ordering::Release);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    camera.release_shutter().await;
                    camera.end_capture(false);
                });
            }
            Err(_) => camera.end_capture(false),
        }
    }
}

fn object_not_found(error: Error) -> Error {
    match error {
        Error::CommandFailed {
            code: Some(ResponseCode::InvalidObjectHandle),
            ..
        } => Error::ObjectNotFound,
        other => other,
    }
}

async fn event_pump(camera: Weak<Inner>, mut events: broadcast::Receiver<EventPacket>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event pump skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(inner) = camera.upgrade() else {
            break;
        };
        Camera { inner }.on_event(event).await;
    }
    debug!("Event pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemorySink, MockCaptureSink};
    use crate::fake_device::{Behavior, FakeDevice, ShutterScript};
    use ptpip_core::SessionState;
    use pretty_assertions::assert_eq;

    fn config(device: &FakeDevice) -> CameraConfig {
        CameraConfig::new("127.0.0.1")
            .with_port(device.port())
            .with_response_timeout(Duration::from_secs(2))
            .with_focus_timeout(Duration::from_millis(200))
            .with_object_timeout(Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(20))
    }

    async fn connect(behavior: Behavior) -> (FakeDevice, Camera, Arc<MemorySink>) {
        let device = FakeDevice::start_with(behavior).await;
        let sink = Arc::new(MemorySink::new());
        let camera = Camera::connect(config(&device), sink.clone()).await.unwrap();
        (device, camera, sink)
    }

    fn shutter_writes() -> Vec<(u32, Vec<u8>)> {
        vec![
            (0xd2c1, vec![2, 0]),
            (0xd2c2, vec![2, 0]),
            (0xd2c2, vec![1, 0]),
            (0xd2c1, vec![1, 0]),
        ]
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let (device, camera, _) = connect(Behavior::default()).await;

        assert_eq!(camera.client().state(), SessionState::Ready);
        assert_eq!(camera.manufacturer(), Manufacturer::Sony);
        assert_eq!(camera.device_info().model.as_deref(), Some("ILCE-7M3"));

        assert_eq!(
            device.operations(),
            vec![
                (OperationCode::OpenSession, vec![1], 0),
                (OperationCode::GetDeviceInfo, vec![], 2),
                (OperationCode::SdioConnect, vec![1, 0, 0], 3),
                (OperationCode::SdioConnect, vec![2, 0, 0], 4),
                (OperationCode::SdioGetExtDeviceInfo, vec![0x12c], 5),
                (OperationCode::SdioConnect, vec![3, 0, 0], 2),
                (OperationCode::GetAllDevicePropData, vec![0], 3),
            ]
        );

        assert_eq!(
            camera.cached_value(PropertyCode::FocusMode),
            Some(PropertyValue::UInt16(0x0002))
        );

        camera.disconnect().await.unwrap();
        assert!(!camera.is_connected());
        assert_eq!(
            device.operations().last().map(|(code, ..)| *code),
            Some(OperationCode::CloseSession)
        );
    }

    #[tokio::test]
    async fn test_connect_without_vendor_extensions() {
        let (device, camera, _) = connect(Behavior {
            sony_extensions: false,
            ..Default::default()
        })
        .await;

        assert_eq!(camera.client().state(), SessionState::Ready);
        assert!(!device
            .operations()
            .iter()
            .any(|(code, ..)| *code == OperationCode::SdioConnect));
    }

    #[tokio::test]
    async fn test_connect_retries_when_another_session_open() {
        let (device, camera, _) = connect(Behavior {
            busy_sessions: 1,
            ..Default::default()
        })
        .await;

        assert!(camera.is_connected());
        let closes = device
            .operations()
            .iter()
            .filter(|(code, ..)| *code == OperationCode::CloseSession)
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_attempts() {
        let device = FakeDevice::start_with(Behavior {
            busy_sessions: 5,
            ..Default::default()
        })
        .await;

        let result = Camera::connect(
            config(&device).with_connect_attempts(2),
            Arc::new(MemorySink::new()),
        )
        .await;
        assert!(matches!(result, Err(Error::AnotherSessionOpen)));
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let device = FakeDevice::start_rejecting(0x2019).await;
        let result = Camera::connect(config(&device), Arc::new(MemorySink::new())).await;

        assert!(matches!(result, Err(Error::InitFailed(0x2019))));
    }

    #[tokio::test]
    async fn test_property_access() {
        let (device, camera, _) = connect(Behavior::default()).await;

        let property = camera
            .get_device_prop_desc(PropertyCode::ObjectInMemory)
            .await
            .unwrap();
        assert_eq!(property.current_value, PropertyValue::UInt16(0));
        assert!(!property.is_settable());

        camera
            .set_control_device_b(PropertyCode::AutoFocus, 2)
            .await
            .unwrap();
        camera
            .set_device_prop_value(PropertyCode::WhiteBalance, 4)
            .await
            .unwrap();
        assert_eq!(
            device.property_writes(),
            vec![(0xd2c1, vec![2, 0]), (0x5005, vec![4, 0])]
        );

        let result = camera.get_device_prop_desc(PropertyCode::Iso).await;
        assert!(matches!(
            result,
            Err(Error::CommandFailed {
                code: Some(ResponseCode::DevicePropNotSupported),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_get_object_info_unknown_handle() {
        let (_device, camera, _) = connect(Behavior::default()).await;

        let result = camera.get_object_info(0x1234).await;
        assert!(matches!(result, Err(Error::ObjectNotFound)));
    }

    #[tokio::test]
    async fn test_take_picture() {
        let (device, camera, sink) = connect(Behavior::default()).await;

        let outcome = camera.take_picture().await.unwrap();

        assert_eq!(
            outcome,
            CaptureOutcome {
                object_id: Some(sony::IN_MEMORY_OBJECT_ID),
                downloaded: true,
            }
        );
        assert_eq!(device.property_writes(), shutter_writes());
        assert_eq!(
            sink.images(ShootingMode::Photo),
            vec![(
                FakeDevice::FILE_NAME.to_string(),
                Bytes::from_static(FakeDevice::IMAGE)
            )]
        );
        assert_eq!(camera.capture_state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_take_picture_object_after_release() {
        let (_device, camera, sink) = connect(Behavior {
            shutter: ShutterScript::FocusThenObjectOnRelease,
            ..Default::default()
        })
        .await;

        let outcome = camera.take_picture().await.unwrap();

        assert_eq!(outcome.object_id, Some(sony::IN_MEMORY_OBJECT_ID));
        assert!(outcome.downloaded);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_take_picture_object_in_memory_fallback() {
        let (_device, camera, sink) = connect(Behavior {
            shutter: ShutterScript::InMemoryOnRelease,
            ..Default::default()
        })
        .await;

        let outcome = camera.take_picture().await.unwrap();

        assert_eq!(outcome.object_id, Some(sony::IN_MEMORY_OBJECT_ID));
        assert!(outcome.downloaded);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_take_picture_no_object() {
        let (device, camera, sink) = connect(Behavior {
            shutter: ShutterScript::Silent,
            focus_mode: 0x0001,
            ..Default::default()
        })
        .await;

        let outcome = camera.take_picture().await.unwrap();

        assert_eq!(outcome, CaptureOutcome::default());
        assert_eq!(device.property_writes(), shutter_writes());
        assert!(sink.is_empty());
        assert_eq!(camera.capture_state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_take_picture_shutter_failure() {
        let (device, camera, _) = connect(Behavior {
            fail_capture: true,
            ..Default::default()
        })
        .await;

        let result = camera.take_picture().await;

        assert!(matches!(
            result,
            Err(Error::CommandFailed {
                operation: OperationCode::SetControlDeviceB,
                code: Some(ResponseCode::GeneralError),
            })
        ));
        assert_eq!(device.property_writes(), shutter_writes());
        assert_eq!(camera.capture_state(), CaptureState::Error);
    }

    #[tokio::test]
    async fn test_continuous_capture() {
        let (device, camera, sink) = connect(Behavior::default()).await;

        camera.start_capturing().await.unwrap();
        assert_eq!(camera.capture_state(), CaptureState::Capturing);
        assert!(matches!(
            camera.take_picture().await,
            Err(Error::CaptureInProgress)
        ));

        let outcome = camera.finish_capturing(true).await.unwrap();

        assert_eq!(outcome.object_id, Some(sony::IN_MEMORY_OBJECT_ID));
        assert!(outcome.downloaded);
        assert_eq!(sink.len(), 1);
        assert_eq!(device.property_writes(), shutter_writes());
        assert_eq!(camera.capture_state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_object_before_focus_skips_focus_wait() {
        let device = FakeDevice::start_with(Behavior::default()).await;
        let camera = Camera::connect(
            config(&device).with_focus_timeout(Duration::from_secs(30)),
            Arc::new(MemorySink::new()),
        )
        .await
        .unwrap();

        let started = Instant::now();
        let outcome = camera.take_picture().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(outcome.object_id, Some(sony::IN_MEMORY_OBJECT_ID));
        assert!(outcome.downloaded);
        assert_eq!(device.property_writes(), shutter_writes());
    }

    #[tokio::test]
    async fn test_abandoned_capture_releases_shutter() {
        let (device, camera, _) = connect(Behavior {
            shutter: ShutterScript::Silent,
            ..Default::default()
        })
        .await;

        let abandoned = tokio::time::timeout(Duration::from_millis(150), camera.take_picture()).await;
        assert!(abandoned.is_err());

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            while !camera.capture_state().is_settled() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(settled.is_ok());
        assert_eq!(camera.capture_state(), CaptureState::Error);
        assert_eq!(device.property_writes(), shutter_writes());

        let outcome = camera.take_picture().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::default());
        assert_eq!(camera.capture_state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_capture_stops_when_device_hangs_up() {
        let device = FakeDevice::start_with(Behavior {
            shutter: ShutterScript::Silent,
            ..Default::default()
        })
        .await;
        let camera = Camera::connect(
            config(&device)
                .with_focus_timeout(Duration::from_secs(30))
                .with_object_timeout(Duration::from_secs(30)),
            Arc::new(MemorySink::new()),
        )
        .await
        .unwrap();

        let capture = tokio::spawn({
            let camera = camera.clone();
            async move { camera.take_picture().await }
        });
        sleep(Duration::from_millis(100)).await;
        device.hang_up();

        let result = tokio::time::timeout(Duration::from_secs(5), capture)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(result, Err(Error::Disconnected)));
        assert!(!camera.is_connected());
        assert_eq!(camera.capture_state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_event_pump_downloads_new_objects() {
        let device = FakeDevice::start().await;
        let (stored_tx, mut stored) = tokio::sync::mpsc::unbounded_channel();

        let mut sink = MockCaptureSink::new();
        sink.expect_store()
            .withf(|mode, file_name, data| {
                *mode == ShootingMode::Photo
                    && file_name == FakeDevice::FILE_NAME
                    && data.as_ref() == FakeDevice::IMAGE
            })
            .times(1)
            .returning(move |_, _, _| {
                let _ = stored_tx.send(());
            });
        let camera = Camera::connect(config(&device), Arc::new(sink)).await.unwrap();

        device.emit_event(0xc201, &[sony::IN_MEMORY_OBJECT_ID]);

        tokio::time::timeout(Duration::from_secs(2), stored.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(camera.last_event().map(|event| event.code), Some(0xc201));

        camera.disconnect().await.unwrap();
    }

    // Requires a Sony camera in PC remote mode at this address
    #[tokio::test]
    #[ignore]
    async fn test_take_picture_real_device() {
        let sink = Arc::new(MemorySink::new());
        let camera = Camera::connect(CameraConfig::new("192.168.122.1"), sink.clone())
            .await
            .unwrap();

        let outcome = camera.take_picture().await.unwrap();
        assert!(outcome.object_id.is_some());

        camera.disconnect().await.unwrap();
    }
}
