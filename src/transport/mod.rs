//! Boundary to the backend connection
//!
//! The socket itself is owned by a collaborator; the core only sees decoded
//! [`TransportEvent`]s and reaches back out through [`TransportLink`].

pub mod wire;

use crate::messages::{Chunk, SessionToken};
use crate::{CompanionError, Result};
use crossbeam_channel::Sender;

pub use wire::{encode_send_message, WireDecoder};

/// One decoded event from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ChunkReceived {
        token: SessionToken,
        chunk: Chunk,
    },
    StreamCompleted {
        token: SessionToken,
        full_text: String,
        /// Number of chunks the backend sent, when it says so
        total_chunks: Option<u64>,
    },
    StreamError {
        token: SessionToken,
        description: String,
    },
}

impl TransportEvent {
    pub fn token(&self) -> &SessionToken {
        match self {
            TransportEvent::ChunkReceived { token, .. }
            | TransportEvent::StreamCompleted { token, .. }
            | TransportEvent::StreamError { token, .. } => token,
        }
    }
}

/// Outbound half of the connection
pub trait TransportLink: Send + Sync {
    /// Send a user message that opens the turn identified by `token`
    fn dispatch_turn(&self, token: &SessionToken, text: &str) -> Result<()>;

    /// Tell the backend a turn is no longer wanted
    fn cancel_turn(&self, _token: &SessionToken) {}
}

/// Something arriving from the backend connection
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Raw `["event", {...}]` frame, decoded by the driver
    Frame(String),
    /// Event already decoded by the collaborator
    Event(TransportEvent),
}

/// Cloneable entry point for the connection's receive side
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: Sender<Inbound>,
}

impl InboundSender {
    pub fn new(tx: Sender<Inbound>) -> Self {
        Self { tx }
    }

    pub fn frame(&self, frame: impl Into<String>) -> Result<()> {
        self.send(Inbound::Frame(frame.into()))
    }

    pub fn event(&self, event: TransportEvent) -> Result<()> {
        self.send(Inbound::Event(event))
    }

    fn send(&self, inbound: Inbound) -> Result<()> {
        self.tx
            .send(inbound)
            .map_err(|e| CompanionError::ChannelError(format!("Driver is gone: {}", e)))
    }
}
