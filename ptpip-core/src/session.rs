//! Session bookkeeping for a PTP/IP connection
//!
//! A session tracks:
//! - Connection id assigned by the device in its init ack
//! - Transaction id counter
//! - Handshake state

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Handshake state of one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No streams open
    Disconnected,

    /// Opening the control stream
    ConnectingControl,

    /// Init command request sent, waiting for the ack
    AwaitingInitAck,

    /// Opening the event stream
    OpeningEventStream,

    /// Init event request sent, waiting for the ack
    AwaitingEventAck,

    /// Both streams open, commands may be sent
    SessionOpen,

    /// Performing the vendor handshake
    VendorHandshake,

    /// Handshake complete
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
///
/// # Examples
///
/// ```
/// use ptpip_core::Session;
///
/// let session = Session::new();
/// assert_eq!(session.next_transaction_id(), 0);
/// assert_eq!(session.next_transaction_id(), 2);
/// assert_eq!(session.next_transaction_id(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Connection number from the init command ack
    connection_id: AtomicU32,

    /// Last transaction id handed out
    transaction_id: AtomicU32,

    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connection_id: AtomicU32::new(0),
                transaction_id: AtomicU32::new(0),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
            }),
        }
    }

    /// Connection id from the init command ack (0 before it arrives)
    pub fn connection_id(&self) -> u32 {
        self.inner.connection_id.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Both streams are up
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            SessionState::SessionOpen | SessionState::VendorHandshake | SessionState::Ready
        )
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    fn transition(&self, from: &[SessionState], to: SessionState) -> Result<()> {
        let mut state = self.inner.state.write();

        if !from.contains(&*state) {
            return Err(Error::InvalidSessionState(format!(
                "Cannot move to {} from {}",
                to, *state
            )));
        }

        tracing::trace!("Session {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    /// Start opening the control stream
    pub fn begin_connect(&self) -> Result<()> {
        self.transition(&[SessionState::Disconnected], SessionState::ConnectingControl)
    }

    /// Control stream is open and the init request went out
    pub fn init_requested(&self) -> Result<()> {
        self.transition(&[SessionState::ConnectingControl], SessionState::AwaitingInitAck)
    }

    /// Init ack received, the event stream is next
    pub fn init_acknowledged(&self, connection_id: u32) -> Result<()> {
        self.transition(&[SessionState::AwaitingInitAck], SessionState::OpeningEventStream)?;
        self.inner.connection_id.store(connection_id, Ordering::Release);
        Ok(())
    }

    pub fn event_requested(&self) -> Result<()> {
        self.transition(&[SessionState::OpeningEventStream], SessionState::AwaitingEventAck)
    }

    pub fn event_acknowledged(&self) -> Result<()> {
        self.transition(&[SessionState::AwaitingEventAck], SessionState::SessionOpen)
    }

    pub fn begin_vendor_handshake(&self) -> Result<()> {
        self.transition(&[SessionState::SessionOpen], SessionState::VendorHandshake)
    }

    pub fn mark_ready(&self) -> Result<()> {
        self.transition(
            &[SessionState::SessionOpen, SessionState::VendorHandshake],
            SessionState::Ready,
        )
    }

    /// Back to disconnected, resetting the counters
    pub fn close(&self) {
        self.inner.connection_id.store(0, Ordering::Release);
        self.inner.transaction_id.store(0, Ordering::Release);
        *self.inner.state.write() = SessionState::Disconnected;
    }

    /// Allocate the next transaction id.
    ///
    /// The very first id is 0. After that ids increase by one and 0 is skipped
    /// on wrap-around, so the sequence runs `0, 2, 3, ..., u32::MAX, 1, 2, ...`.
    pub fn next_transaction_id(&self) -> u32 {
        let previous = self
            .inner
            .transaction_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| Some(step(current)))
            .unwrap_or_else(|current| current);

        if previous == 0 { 0 } else { step(previous) }
    }

    /// Overwrite the counter; the next id handed out is `value + 1`
    pub fn reset_transaction_id(&self, value: u32) {
        self.inner.transaction_id.store(value, Ordering::Release);
    }
}

fn step(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
