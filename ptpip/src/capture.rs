//! Capture state, sinks and the bounded waits used while taking a picture

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use ptpip_core::{EventPacket, PropertyCode};
use ptpip_types::ShootingMode;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Where a capture currently stands
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing,
    AwaitingFocus,
    AwaitingObject,
    Downloading,
    Error,
}

impl CaptureState {
    /// A new capture may start from here
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of [`Camera::take_picture`](crate::Camera::take_picture)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureOutcome {
    /// Handle of the captured object, if the device reported one in time
    pub object_id: Option<u32>,
    /// The object was fetched and handed to the sink
    pub downloaded: bool,
}

/// Receives every downloaded object
#[cfg_attr(test, mockall::automock)]
pub trait CaptureSink: Send + Sync {
    fn store(&self, mode: ShootingMode, file_name: &str, data: Bytes);
}

/// Keeps downloaded images in memory, grouped by shooting mode
#[derive(Debug, Default)]
pub struct MemorySink {
    images: Mutex<HashMap<ShootingMode, Vec<(String, Bytes)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images stored for `mode`, oldest first
    pub fn images(&self, mode: ShootingMode) -> Vec<(String, Bytes)> {
        self.images.lock().get(&mode).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaptureSink for MemorySink {
    fn store(&self, mode: ShootingMode, file_name: &str, data: Bytes) {
        self.images
            .lock()
            .entry(mode)
            .or_default()
            .push((file_name.to_string(), data));
    }
}

/// What an event means to a capture in progress
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Signal {
    Focused,
    ObjectAdded(u32),
}

impl Signal {
    pub(crate) fn from_event(event: &EventPacket) -> Option<Self> {
        let code = event.event_code()?;
        if code.is_object_added() {
            return event.first_parameter().map(Self::ObjectAdded);
        }
        if code.is_property_changed()
            && event.first_parameter() == Some(u32::from(u16::from(PropertyCode::FocusFound)))
        {
            return Some(Self::Focused);
        }
        None
    }
}

/// Next capture-relevant event already queued on `events`.
///
/// Fails once the session has dropped its event sender.
pub(crate) fn next_signal(events: &mut broadcast::Receiver<EventPacket>) -> Result<Option<Signal>> {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(signal) = Signal::from_event(&event) {
                    return Ok(Some(signal));
                }
                trace!("Ignoring event 0x{:04X} during capture", event.code);
            }
            Err(TryRecvError::Lagged(skipped)) => warn!("Capture missed {} events", skipped),
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Closed) => return Err(Error::Disconnected),
        }
    }
}

/// Next "object added" already queued on `events`, skipping focus signals
pub(crate) fn next_object(events: &mut broadcast::Receiver<EventPacket>) -> Result<Option<u32>> {
    while let Some(signal) = next_signal(events)? {
        if let Signal::ObjectAdded(object_id) = signal {
            return Ok(Some(object_id));
        }
    }
    Ok(None)
}

/// Sleep one poll interval, or fail as soon as the session goes away
pub(crate) async fn tick(disconnected: &mut watch::Receiver<bool>, poll_interval: Duration) -> Result<()> {
    tokio::select! {
        _ = sleep(poll_interval) => Ok(()),
        _ = disconnected.wait_for(|closed| *closed) => Err(Error::Disconnected),
    }
}

/// Poll `events` until focus is found or an object appears.
///
/// `None` means the deadline passed; the caller proceeds regardless.
pub(crate) async fn wait_for_focus(
    events: &mut broadcast::Receiver<EventPacket>,
    captured: &Mutex<Option<u32>>,
    disconnected: &mut watch::Receiver<bool>,
    deadline: Duration,
    poll_interval: Duration,
) -> Result<Option<Signal>> {
    let until = Instant::now() + deadline;
    loop {
        if let Some(signal) = next_signal(events)? {
            return Ok(Some(signal));
        }
        if let Some(object_id) = captured.lock().take() {
            return Ok(Some(Signal::ObjectAdded(object_id)));
        }
        if Instant::now() >= until {
            return Ok(None);
        }
        tick(disconnected, poll_interval).await?;
    }
}
