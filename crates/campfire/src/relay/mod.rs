//! The transport boundary.
//!
//! The engine needs only a handful of primitives from whatever carries
//! messages between peers: publish, subscribe, presence membership, and a
//! short replayable history. Delivery is assumed to be at-least-once,
//! possibly duplicated, possibly out of order. Correctness comes from the
//! version merge in the reconciler, not from the transport.
//!
//! Reconnection and backoff belong to the implementation behind this
//! trait. [`LocalRelay`] is an in-process implementation used by the demo
//! CLI and the tests.

mod local;

pub use local::LocalRelay;

use std::time::Duration;

use async_trait::async_trait;
use campproto::{Envelope, Participant};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Membership change reported by the relay's presence facility.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Enter(Participant),
    Update(Participant),
    Leave(Participant),
}

impl PresenceEvent {
    pub fn participant(&self) -> &Participant {
        match self {
            PresenceEvent::Enter(p) | PresenceEvent::Update(p) | PresenceEvent::Leave(p) => p,
        }
    }
}

/// Anything a subscription can deliver.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Message(Envelope),
    Presence(PresenceEvent),
}

/// Transport failures. All of them are recoverable by retrying later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    #[error("relay {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("relay rejected {0}")]
    Rejected(String),

    #[error("relay subscription closed")]
    Closed,

    #[error("relay codec error: {0}")]
    Codec(String),
}

/// A live feed of relay events.
pub struct Subscription {
    rx: broadcast::Receiver<RelayEvent>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<RelayEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the relay side is gone.
    ///
    /// A slow subscriber that falls behind skips the missed events. That is
    /// safe here: every state message is a complete replacement and the
    /// arbitration loop re-derives everything on its next tick.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("relay subscription lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publish/subscribe plus presence, as seen by one peer.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Hand an envelope to the relay for fan-out and history.
    async fn publish(&self, envelope: Envelope) -> Result<(), RelayError>;

    /// Start receiving messages and presence events.
    async fn subscribe(&self) -> Result<Subscription, RelayError>;

    async fn enter(&self, member: Participant) -> Result<(), RelayError>;

    async fn update(&self, member: Participant) -> Result<(), RelayError>;

    async fn leave(&self, member: &Participant) -> Result<(), RelayError>;

    /// Current presence snapshot.
    async fn members(&self) -> Result<Vec<Participant>, RelayError>;

    /// Up to `limit` most recent messages, oldest first.
    async fn history(&self, limit: usize) -> Result<Vec<Envelope>, RelayError>;
}
