//! Routing of received packets to waiting callers
//!
//! The dispatcher holds every continuation registered for a transaction:
//! command responses, inbound data phases and keepalive pongs. It is owned by
//! the client task, so each callback fires at most once.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use ptpip_core::{CommandResponse, EventPacket, Packet, ResponseCode};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

/// Outcome delivered to a data callback: the payload, or the failing response code
pub(crate) type DataResult = std::result::Result<Bytes, Option<ResponseCode>>;

struct PendingCommand {
    reply: oneshot::Sender<CommandResponse>,
    /// Accepts a response for any transaction
    any: bool,
}

pub(crate) struct Dispatcher {
    commands: HashMap<u32, PendingCommand>,
    data: HashMap<u32, oneshot::Sender<DataResult>>,
    containers: HashMap<u32, BytesMut>,
    pongs: Vec<oneshot::Sender<()>>,
    events: broadcast::Sender<EventPacket>,
}

impl Dispatcher {
    pub fn new(events: broadcast::Sender<EventPacket>) -> Self {
        Self {
            commands: HashMap::new(),
            data: HashMap::new(),
            containers: HashMap::new(),
            pongs: Vec::new(),
            events,
        }
    }

    /// Wait for the response to `transaction_id`, or to any transaction when `any` is set
    pub fn expect_response(
        &mut self,
        transaction_id: u32,
        reply: oneshot::Sender<CommandResponse>,
        any: bool,
    ) {
        if self
            .commands
            .insert(transaction_id, PendingCommand { reply, any })
            .is_some()
        {
            warn!("Replaced pending command callback for transaction {}", transaction_id);
        }
    }

    /// Wait for the inbound data phase of `transaction_id`
    pub fn expect_data(&mut self, transaction_id: u32, reply: oneshot::Sender<DataResult>) {
        self.data.insert(transaction_id, reply);
    }

    pub fn expect_pong(&mut self, reply: oneshot::Sender<()>) {
        self.pongs.push(reply);
    }

    /// Number of callbacks still waiting
    pub fn pending(&self) -> usize {
        self.commands.len() + self.data.len() + self.pongs.len()
    }

    /// Drop the callbacks of a transaction whose caller stopped waiting
    pub fn forget(&mut self, transaction_id: u32) {
        let command = self.commands.remove(&transaction_id).is_some();
        let data = self.data.remove(&transaction_id).is_some();
        self.containers.remove(&transaction_id);
        if command || data {
            debug!("Forgot callbacks for transaction {}", transaction_id);
        }
    }

    /// Drop every callback and container; waiting callers see their channel close
    pub fn clear(&mut self) {
        self.commands.clear();
        self.data.clear();
        self.containers.clear();
        self.pongs.clear();
    }

    /// Route one packet. Returns a packet to send back on the same stream, if any.
    pub fn dispatch(&mut self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::CommandResponse(response) => return self.on_response(response),
            Packet::StartData {
                transaction_id,
                total_length,
            } => {
                trace!("Data phase for transaction {} ({} bytes)", transaction_id, total_length);
                let container = BytesMut::with_capacity(total_length.min(16 * 1024 * 1024) as usize);
                if self.containers.insert(transaction_id, container).is_some() {
                    warn!("Discarded stale data container for transaction {}", transaction_id);
                }
            }
            Packet::Data {
                transaction_id,
                payload,
            } => match self.containers.get_mut(&transaction_id) {
                Some(container) => container.extend_from_slice(&payload),
                None => warn!("Data for unknown transaction {}", transaction_id),
            },
            Packet::EndData {
                transaction_id,
                payload,
            } => match self.containers.remove(&transaction_id) {
                Some(mut container) => {
                    container.extend_from_slice(&payload);
                    self.deliver_data(transaction_id, Ok(container.freeze()));
                }
                None => warn!("End of data for unknown transaction {}", transaction_id),
            },
            Packet::Cancel { transaction_id } => {
                debug!("Device cancelled transaction {}", transaction_id);
                self.containers.remove(&transaction_id);
                self.deliver_data(transaction_id, Err(None));
            }
            Packet::Event(event) => {
                trace!("Event 0x{:04X} {:08X?}", event.code, event.parameters);
                // No subscribers is fine
                let _ = self.events.send(event);
            }
            Packet::Ping => return Some(Packet::Pong),
            Packet::Pong => {
                for pong in self.pongs.drain(..) {
                    let _ = pong.send(());
                }
            }
            Packet::InitFail { reason } => warn!("Init failure after handshake (0x{:08X})", reason),
            other => debug!("Ignoring {}", other),
        }
        None
    }

    fn on_response(&mut self, response: CommandResponse) -> Option<Packet> {
        if response.awaiting_further_data {
            trace!("Skipping response still awaiting data");
            return None;
        }

        if let Some(transaction_id) = response.transaction_id {
            self.settle_data(transaction_id, &response);

            if let Some(pending) = self.commands.remove(&transaction_id) {
                let _ = pending.reply.send(response);
                return None;
            }
        }

        let any: Vec<u32> = self
            .commands
            .iter()
            .filter(|(_, pending)| pending.any)
            .map(|(transaction_id, _)| *transaction_id)
            .collect();

        if any.is_empty() {
            match response.transaction_id {
                Some(transaction_id) => warn!("Response for unknown transaction {}", transaction_id),
                None => debug!("Response without transaction id and no callback for it yet"),
            }
            return None;
        }

        for transaction_id in any {
            if let Some(pending) = self.commands.remove(&transaction_id) {
                let _ = pending.reply.send(response.clone());
            }
        }
        None
    }

    /// A response ends the data phase of its transaction even without end-data
    fn settle_data(&mut self, transaction_id: u32, response: &CommandResponse) {
        if !self.data.contains_key(&transaction_id) {
            return;
        }

        if response.is_error() {
            self.containers.remove(&transaction_id);
            self.deliver_data(transaction_id, Err(response.code));
        } else {
            let container = self.containers.remove(&transaction_id).unwrap_or_default();
            self.deliver_data(transaction_id, Ok(container.freeze()));
        }
    }

    fn deliver_data(&mut self, transaction_id: u32, result: DataResult) {
        match self.data.remove(&transaction_id) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => debug!("No data callback for transaction {}", transaction_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dispatcher() -> (Dispatcher, broadcast::Receiver<EventPacket>) {
        let (events, receiver) = broadcast::channel(16);
        (Dispatcher::new(events), receiver)
    }

    fn ok(transaction_id: u32) -> Packet {
        Packet::CommandResponse(CommandResponse::new(ResponseCode::Okay, transaction_id, vec![]))
    }

    fn response_without_id(code: ResponseCode) -> Packet {
        Packet::CommandResponse(CommandResponse {
            transaction_id: None,
            ..CommandResponse::new(code, 0, vec![])
        })
    }

    #[test]
    fn test_response_by_transaction_id() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_response(3, tx, false);

        dispatcher.dispatch(ok(2));
        assert!(rx.try_recv().is_err());

        dispatcher.dispatch(ok(3));
        assert_eq!(rx.try_recv().unwrap().transaction_id, Some(3));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_response_sends_nothing_back() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_response(2, tx, false);

        assert_eq!(dispatcher.dispatch(ok(2)), None);
        assert_eq!(dispatcher.dispatch(ok(8)), None);
        assert_eq!(rx.try_recv().unwrap().code, Some(ResponseCode::Okay));
    }

    #[test]
    fn test_forget_drops_abandoned_transaction() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, _rx) = oneshot::channel();
        let (data_tx, _data_rx) = oneshot::channel();
        let (kept_tx, mut kept_rx) = oneshot::channel();
        dispatcher.expect_response(4, tx, false);
        dispatcher.expect_data(4, data_tx);
        dispatcher.expect_response(5, kept_tx, false);
        dispatcher.dispatch(Packet::StartData {
            transaction_id: 4,
            total_length: 8,
        });

        dispatcher.forget(4);
        assert_eq!(dispatcher.pending(), 1);

        // Late packets for the forgotten transaction go nowhere
        dispatcher.dispatch(Packet::EndData {
            transaction_id: 4,
            payload: Bytes::from_static(&[1, 2]),
        });
        dispatcher.dispatch(ok(4));
        assert_eq!(dispatcher.pending(), 1);

        dispatcher.dispatch(ok(5));
        assert!(kept_rx.try_recv().is_ok());
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_error_response_is_normal_completion() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_response(4, tx, false);

        dispatcher.dispatch(Packet::CommandResponse(CommandResponse::new(
            ResponseCode::DeviceBusy,
            4,
            vec![],
        )));

        let response = rx.try_recv().unwrap();
        assert!(response.is_error());
        assert_eq!(response.code, Some(ResponseCode::DeviceBusy));
    }

    #[test]
    fn test_response_without_id_goes_to_any() {
        let (mut dispatcher, _) = dispatcher();
        let (any_tx, mut any_rx) = oneshot::channel();
        let (other_tx, mut other_rx) = oneshot::channel();
        dispatcher.expect_response(0, any_tx, true);
        dispatcher.expect_response(5, other_tx, false);

        dispatcher.dispatch(response_without_id(ResponseCode::Okay));

        assert_eq!(any_rx.try_recv().unwrap().code, Some(ResponseCode::Okay));
        assert!(other_rx.try_recv().is_err());
        assert_eq!(dispatcher.pending(), 1);
    }

    #[test]
    fn test_response_without_id_keeps_callbacks() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_response(7, tx, false);

        dispatcher.dispatch(response_without_id(ResponseCode::Okay));
        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.pending(), 1);

        dispatcher.dispatch(ok(7));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_awaiting_response_skipped() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_response(0, tx, true);

        dispatcher.dispatch(Packet::CommandResponse(CommandResponse::malformed(14)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_data_phase_reassembly() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_data(9, tx);

        dispatcher.dispatch(Packet::StartData {
            transaction_id: 9,
            total_length: 6,
        });
        dispatcher.dispatch(Packet::Data {
            transaction_id: 9,
            payload: Bytes::from_static(&[1, 2, 3]),
        });
        assert!(rx.try_recv().is_err());

        dispatcher.dispatch(Packet::EndData {
            transaction_id: 9,
            payload: Bytes::from_static(&[4, 5, 6]),
        });
        assert_eq!(rx.try_recv().unwrap().unwrap().as_ref(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_data_for_unknown_transaction_ignored() {
        let (mut dispatcher, _) = dispatcher();
        dispatcher.dispatch(Packet::Data {
            transaction_id: 1,
            payload: Bytes::from_static(&[1]),
        });
        dispatcher.dispatch(Packet::EndData {
            transaction_id: 1,
            payload: Bytes::new(),
        });
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_error_response_fails_data_callback() {
        let (mut dispatcher, _) = dispatcher();
        let (data_tx, mut data_rx) = oneshot::channel();
        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_data(2, data_tx);
        dispatcher.expect_response(2, tx, false);

        dispatcher.dispatch(Packet::CommandResponse(CommandResponse::new(
            ResponseCode::InvalidObjectHandle,
            2,
            vec![],
        )));

        assert_eq!(data_rx.try_recv().unwrap(), Err(Some(ResponseCode::InvalidObjectHandle)));
        assert!(rx.try_recv().unwrap().is_error());
    }

    #[test]
    fn test_ok_response_delivers_container_without_end_data() {
        let (mut dispatcher, _) = dispatcher();
        let (data_tx, mut data_rx) = oneshot::channel();
        dispatcher.expect_data(2, data_tx);

        dispatcher.dispatch(Packet::StartData {
            transaction_id: 2,
            total_length: 2,
        });
        dispatcher.dispatch(Packet::Data {
            transaction_id: 2,
            payload: Bytes::from_static(&[0xab, 0xcd]),
        });
        dispatcher.dispatch(ok(2));

        assert_eq!(data_rx.try_recv().unwrap().unwrap().as_ref(), &[0xab, 0xcd]);
    }

    #[test]
    fn test_events_forwarded() {
        let (mut dispatcher, mut events) = dispatcher();
        let event = EventPacket {
            code: 0xc201,
            transaction_id: None,
            parameters: vec![0xffff_c001],
        };

        dispatcher.dispatch(Packet::Event(event.clone()));
        assert_eq!(events.try_recv().unwrap(), event);
    }

    #[test]
    fn test_ping_answered_and_pong_resolves() {
        let (mut dispatcher, _) = dispatcher();
        assert_eq!(dispatcher.dispatch(Packet::Ping), Some(Packet::Pong));

        let (tx, mut rx) = oneshot::channel();
        dispatcher.expect_pong(tx);
        assert_eq!(dispatcher.dispatch(Packet::Pong), None);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_clear_closes_callers() {
        let (mut dispatcher, _) = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        let (data_tx, mut data_rx) = oneshot::channel();
        dispatcher.expect_response(1, tx, false);
        dispatcher.expect_data(1, data_tx);

        dispatcher.clear();

        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        assert!(matches!(data_rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        assert_eq!(dispatcher.pending(), 0);
    }
}
