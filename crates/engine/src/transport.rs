//! Outbound side of the protocol transport.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use stackview_core::ItemId;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is disconnected")]
    Disconnected,

    #[error("failed to send {command}: {reason}")]
    Send { command: &'static str, reason: String },
}

/// Commands the engine issues to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    RequestNextBatch,
    AddItemToOffer(ItemId),
    AcceptTrade,
    PickupItem(ItemId),
    PlaceItem { item_id: ItemId, x: i32, y: i32 },
}

impl OutboundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::RequestNextBatch => "request_next_batch",
            OutboundCommand::AddItemToOffer(_) => "add_item_to_offer",
            OutboundCommand::AcceptTrade => "accept_trade",
            OutboundCommand::PickupItem(_) => "pickup_item",
            OutboundCommand::PlaceItem { .. } => "place_item",
        }
    }
}

/// Outbound transport.
///
/// Delivery is the transport's business: the engine never retries, and a
/// failed send only shows up as the absence of the expected inbound event.
pub trait Transport: Send + Sync {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError>;

    fn request_next_batch(&self) -> Result<(), TransportError> {
        self.send(OutboundCommand::RequestNextBatch)
    }

    fn add_item_to_offer(&self, item_id: ItemId) -> Result<(), TransportError> {
        self.send(OutboundCommand::AddItemToOffer(item_id))
    }

    fn accept_trade(&self) -> Result<(), TransportError> {
        self.send(OutboundCommand::AcceptTrade)
    }

    fn pickup_item(&self, item_id: ItemId) -> Result<(), TransportError> {
        self.send(OutboundCommand::PickupItem(item_id))
    }

    fn place_item(&self, item_id: ItemId, x: i32, y: i32) -> Result<(), TransportError> {
        self.send(OutboundCommand::PlaceItem { item_id, x, y })
    }
}

/// In-memory transport for tests and the simulator.
///
/// Records every command and optionally forwards it to a channel so a fake
/// remote can answer.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<OutboundCommand>>,
    forward: Option<mpsc::UnboundedSender<OutboundCommand>>,
    failing: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose commands are also delivered to the returned receiver.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            forward: Some(tx),
            ..Self::default()
        };
        (transport, rx)
    }

    /// Make every subsequent send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Commands accepted so far, in order.
    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, command: &OutboundCommand) -> usize {
        self.sent().iter().filter(|c| *c == command).count()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                command: command.name(),
                reason: "simulated failure".to_string(),
            });
        }

        if let Some(tx) = &self.forward {
            tx.send(command.clone())
                .map_err(|_| TransportError::Disconnected)?;
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command);
        }
        Ok(())
    }
}
