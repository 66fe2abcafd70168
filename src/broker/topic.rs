use std::sync::RwLock;

use bytes::Bytes;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

/// Represents a pub/sub topic, which maintains a list of subscribers.
///
/// A `Topic` is an addressable channel identified by a 64-bit integer to
/// which producers publish and from which subscribers receive. Read access is
/// guarded by an opaque token. Static topics — the reserved metrics topic and
/// topics declared in configuration — cannot be deleted at runtime.
#[derive(Debug)]
pub struct Topic {
    /// The unique, stable id of the topic.
    pub id: i64,

    /// Whether the topic was reserved by the system or declared in
    /// configuration. Static topics survive every delete request.
    pub is_static: bool,

    /// Opaque token authorizing subscriptions.
    token: Vec<u8>,

    /// The current subscribers. Held in read mode only to snapshot during a
    /// publish; in write mode for subscribe, unsubscribe and delete.
    pub(crate) subscribers: RwLock<Vec<Subscriber>>,
}

/// A single consumer of a topic: an id and the sending half of its message
/// channel. The receiving half is owned by the connection driver.
#[derive(Clone, Debug)]
pub struct Subscriber {
    pub id: i64,
    pub sender: mpsc::Sender<Bytes>,
}

impl Topic {
    pub fn new(id: i64, token: Vec<u8>, is_static: bool) -> Self {
        Self {
            id,
            is_static,
            token,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Compares a presented token against the topic token in constant time.
    pub fn verify_token(&self, presented: &[u8]) -> bool {
        bool::from(self.token.as_slice().ct_eq(presented))
    }

    /// Appends a subscriber to the topic.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.write().unwrap().push(subscriber);
    }

    /// Removes a subscriber by id in O(1), swapping it with the last entry.
    /// The subscriber's channel is not closed here; the driver owns the
    /// receiving side and simply stops reading.
    pub fn unsubscribe(&self, id: i64) {
        let mut subscribers = self.subscribers.write().unwrap();
        if let Some(idx) = subscribers.iter().position(|s| s.id == id) {
            subscribers.swap_remove(idx);
        }
    }

    /// Returns a shallow copy of the current subscribers.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.read().unwrap().clone()
    }
}
