//! In-process relay: broadcast fan-out, a bounded history ring buffer, and
//! a presence table.
//!
//! Published envelopes pass through the JSON wire encoding, so a state
//! that would not survive a real relay fails here too.
//!
//! Fault knobs let tests drive the transport-failure paths: failing the
//! next N publishes, taking the relay offline, and delivering every
//! message twice.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use campproto::{Envelope, Participant, ParticipantId};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info};

use super::{PresenceEvent, Relay, RelayError, RelayEvent, Subscription};

/// Default history capacity, in messages.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Faults {
    fail_publishes: u32,
    offline: bool,
    duplicate: bool,
}

struct Inner {
    events: broadcast::Sender<RelayEvent>,
    history: RwLock<VecDeque<Envelope>>,
    history_capacity: usize,
    members: RwLock<HashMap<ParticipantId, Participant>>,
    faults: Mutex<Faults>,
}

/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct LocalRelay {
    inner: Arc<Inner>,
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                events,
                history: RwLock::new(VecDeque::with_capacity(history_capacity)),
                history_capacity,
                members: RwLock::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    /// Make the next `count` publishes fail with [`RelayError::Rejected`].
    pub async fn fail_next_publishes(&self, count: u32) {
        self.inner.faults.lock().await.fail_publishes = count;
    }

    /// While offline every operation fails with [`RelayError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        self.inner.faults.lock().await.offline = offline;
    }

    /// Deliver every published message twice.
    pub async fn set_duplicate_delivery(&self, duplicate: bool) {
        self.inner.faults.lock().await.duplicate = duplicate;
    }

    /// Deliver an envelope to subscribers without recording it in history,
    /// as if it arrived late from a peer this relay never saw publish.
    pub fn inject(&self, envelope: Envelope) {
        let _ = self.inner.events.send(RelayEvent::Message(envelope));
    }

    pub async fn history_len(&self) -> usize {
        self.inner.history.read().await.len()
    }

    async fn check_online(&self) -> Result<(), RelayError> {
        if self.inner.faults.lock().await.offline {
            return Err(RelayError::Unavailable("local relay is offline".to_string()));
        }
        Ok(())
    }

    fn broadcast(&self, event: RelayEvent) {
        // No subscribers is not an error for a relay.
        let _ = self.inner.events.send(event);
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn publish(&self, envelope: Envelope) -> Result<(), RelayError> {
        let duplicate = {
            let mut faults = self.inner.faults.lock().await;
            if faults.offline {
                return Err(RelayError::Unavailable("local relay is offline".to_string()));
            }
            if faults.fail_publishes > 0 {
                faults.fail_publishes -= 1;
                return Err(RelayError::Rejected(format!("message {}", envelope.id)));
            }
            faults.duplicate
        };

        let bytes = envelope
            .to_bytes()
            .map_err(|e| RelayError::Codec(e.to_string()))?;
        let envelope =
            Envelope::from_bytes(&bytes).map_err(|e| RelayError::Codec(e.to_string()))?;

        {
            let mut history = self.inner.history.write().await;
            if history.len() >= self.inner.history_capacity {
                history.pop_front();
            }
            if self.inner.history_capacity > 0 {
                history.push_back(envelope.clone());
            }
        }

        debug!(id = %envelope.id, sender = %envelope.sender, "relay publish");
        if duplicate {
            self.broadcast(RelayEvent::Message(envelope.clone()));
        }
        self.broadcast(RelayEvent::Message(envelope));
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, RelayError> {
        self.check_online().await?;
        Ok(Subscription::new(self.inner.events.subscribe()))
    }

    async fn enter(&self, member: Participant) -> Result<(), RelayError> {
        self.check_online().await?;
        info!("presence enter: {} ({})", member.name, member.id);
        self.inner
            .members
            .write()
            .await
            .insert(member.id.clone(), member.clone());
        self.broadcast(RelayEvent::Presence(PresenceEvent::Enter(member)));
        Ok(())
    }

    async fn update(&self, member: Participant) -> Result<(), RelayError> {
        self.check_online().await?;
        self.inner
            .members
            .write()
            .await
            .insert(member.id.clone(), member.clone());
        self.broadcast(RelayEvent::Presence(PresenceEvent::Update(member)));
        Ok(())
    }

    async fn leave(&self, member: &Participant) -> Result<(), RelayError> {
        self.check_online().await?;
        if self.inner.members.write().await.remove(&member.id).is_some() {
            info!("presence leave: {} ({})", member.name, member.id);
            self.broadcast(RelayEvent::Presence(PresenceEvent::Leave(member.clone())));
        }
        Ok(())
    }

    async fn members(&self) -> Result<Vec<Participant>, RelayError> {
        self.check_online().await?;
        Ok(self.inner.members.read().await.values().cloned().collect())
    }

    async fn history(&self, limit: usize) -> Result<Vec<Envelope>, RelayError> {
        self.check_online().await?;
        let history = self.inner.history.read().await;
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }
}
