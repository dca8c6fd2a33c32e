//! In-process publish/subscribe bus for timer records.
//!
//! Every instance of the same timer (for example one per open window)
//! subscribes to the identity's topic and adopts records that win under
//! last-writer-wins. Ordering comes from the records' write stamps, never
//! from arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::types::{PersistedTimerRecord, TimerIdentity};

/// Buffered messages per topic. Slow receivers skip to the newest record.
const TOPIC_CAPACITY: usize = 64;

// ============================================================================
// BusMessage
// ============================================================================

/// A record published by one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Instance id of the publisher
    pub source: String,
    /// Identity the record belongs to
    pub identity: TimerIdentity,
    /// The record as persisted
    pub record: PersistedTimerRecord,
}

// ============================================================================
// CrossInstanceBus
// ============================================================================

/// Hub of per-identity broadcast topics. Clones share the same topics.
#[derive(Debug, Clone, Default)]
pub struct CrossInstanceBus {
    topics: Arc<Mutex<HashMap<TimerIdentity, broadcast::Sender<BusMessage>>>>,
}

impl CrossInstanceBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, identity: &TimerIdentity) -> broadcast::Sender<BusMessage> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(identity.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Broadcasts a just-saved record to every other subscriber.
    ///
    /// Publishing with no subscribers is a no-op.
    pub fn publish(&self, source: &str, identity: &TimerIdentity, record: &PersistedTimerRecord) {
        let message = BusMessage {
            source: source.to_string(),
            identity: identity.clone(),
            record: record.clone(),
        };
        let receivers = self.topic(identity).send(message).unwrap_or(0);
        tracing::trace!(identity = %identity, receivers, "レコードを配信しました");
    }

    /// Subscribes to records for `identity`, skipping those published by `own_id`.
    pub fn subscribe(&self, identity: &TimerIdentity, own_id: &str) -> BusSubscription {
        BusSubscription {
            receiver: self.topic(identity).subscribe(),
            own_id: own_id.to_string(),
        }
    }
}

// ============================================================================
// BusSubscription
// ============================================================================

/// Receiving end of one instance's subscription.
#[derive(Debug)]
pub struct BusSubscription {
    receiver: broadcast::Receiver<BusMessage>,
    own_id: String,
}

impl BusSubscription {
    /// Returns the next foreign message without waiting.
    pub fn try_next(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if message.source == self.own_id => continue,
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "配信メッセージを読み飛ばしました");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next foreign message. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.source == self.own_id => continue,
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "配信メッセージを読み飛ばしました");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
