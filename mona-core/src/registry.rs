//! Subscriber admission and membership bookkeeping.
//!
//! Every admitted subscriber gets a bounded outbound queue. The registry
//! keeps the sending halves; the connection task owns the receiving half
//! as a [`Subscription`] and writes queued frames to its socket.
//!
//! Admission reads the state snapshot, queues it as the first frame and
//! registers the subscriber while holding the state read lock. Event
//! application holds the write lock while the broadcaster captures its
//! targets. An event is therefore either part of a subscriber's snapshot
//! or delivered to it as an update, never both and never neither.
//!
//! A pruned subscriber stops receiving frames but keeps counting against
//! `max_subscribers` until its connection task drops the [`Subscription`].

use crate::config::RegistryConfig;
use crate::state::StateStore;
use mona_sdk::objects::WsServerMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

/// A serialized JSON text frame, shared between all recipients.
pub type Frame = Arc<str>;

/// Serialize a server message into a [`Frame`].
pub fn encode_frame(message: &WsServerMessage) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(message).map(Frame::from)
}

/// Errors that can occur during admission.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("subscriber limit of {limit} reached")]
    AtCapacity { limit: usize },

    #[error("registry is closed")]
    Closed,

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection task is gone.
    Closed,
    /// The outbound queue is full; the subscriber is not keeping up.
    Stalled,
}

/// The registry's sending half for one subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
}

impl SubscriberHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue `frame` without waiting.
    pub fn try_deliver(&self, frame: &Frame) -> Result<(), DeliveryFailure> {
        self.tx.try_send(frame.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Stalled,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// The receiving half owned by a connection task.
///
/// Dropping it removes the subscriber from the registry.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Frame>,
    registry: ConnectionRegistry,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next frame to write. The first one is always the snapshot.
    ///
    /// Returns `None` after the subscriber was pruned or the registry was
    /// closed, once all queued frames are drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Stop accepting frames. The subscriber stays registered until the
    /// next broadcast prunes it or this value is dropped.
    #[cfg(test)]
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }

    /// Take the next queued frame without waiting.
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[derive(Debug, Default)]
struct Members {
    closed: bool,
    by_id: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// No longer receiving frames, connection task still running.
    pruned: HashSet<Uuid>,
}

impl Members {
    fn len(&self) -> usize {
        self.by_id.len() + self.pruned.len()
    }
}

#[derive(Debug)]
struct RegistryInner {
    store: StateStore,
    config: RegistryConfig,
    members: Mutex<Members>,
}

/// Shared handle to the set of active subscribers.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(store: StateStore, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                config,
                members: Mutex::new(Members::default()),
            }),
        }
    }

    /// The state store snapshots are read from.
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// Admit a new subscriber.
    ///
    /// The returned [`Subscription`] already holds the snapshot frame.
    pub fn admit(&self) -> Result<Subscription, RegistryError> {
        let limit = self.inner.config.max_subscribers;
        let capacity = self.inner.config.queue_capacity.max(1);

        let (id, rx, active) = self.inner.store.with_snapshot(|snapshot| {
            let frame = encode_frame(&snapshot.to_message())?;

            let mut members = self.inner.members.lock();
            if members.closed {
                return Err(RegistryError::Closed);
            }
            if members.len() >= limit {
                return Err(RegistryError::AtCapacity { limit });
            }

            let (tx, rx) = mpsc::channel(capacity);
            // A fresh queue with room for at least one frame.
            tx.try_send(frame).map_err(|_| RegistryError::Closed)?;

            let id = Uuid::now_v7();
            members.by_id.insert(id, tx);
            Ok((id, rx, members.len()))
        })?;

        info!(subscriber = %id, active, "Subscriber admitted");

        Ok(Subscription {
            id,
            rx,
            registry: self.clone(),
        })
    }

    /// Stop delivering to a subscriber and drop its queue.
    ///
    /// The slot stays taken until the [`Subscription`] is dropped. Returns
    /// `true` if the subscriber was still active.
    pub fn prune(&self, id: Uuid) -> bool {
        let mut members = self.inner.members.lock();
        let pruned = members.by_id.remove(&id).is_some();
        if pruned {
            members.pruned.insert(id);
        }
        drop(members);

        if pruned {
            debug!(subscriber = %id, "Subscriber pruned");
        }
        pruned
    }

    /// Release a subscriber's slot. Idempotent.
    ///
    /// Returns `true` if the subscriber was still registered.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut members = self.inner.members.lock();
        let removed = members.by_id.remove(&id).is_some() | members.pruned.remove(&id);
        let registered = members.len();
        drop(members);

        if removed {
            debug!(subscriber = %id, registered, "Subscriber removed");
        }
        removed
    }

    /// Point-in-time copy of the active subscribers.
    pub fn active_subscribers(&self) -> Vec<SubscriberHandle> {
        self.inner
            .members
            .lock()
            .by_id
            .iter()
            .map(|(id, tx)| SubscriberHandle {
                id: *id,
                tx: tx.clone(),
            })
            .collect()
    }

    /// Registered subscribers, pruned ones included.
    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether admission would currently be rejected for capacity.
    pub fn is_full(&self) -> bool {
        self.len() >= self.inner.config.max_subscribers
    }

    /// `true` after [`close_all`](Self::close_all).
    pub fn is_closed(&self) -> bool {
        self.inner.members.lock().closed
    }

    /// Stop admitting and drop every subscriber's queue.
    ///
    /// Connection tasks drain what is already queued and then see the end
    /// of their subscription. Returns how many subscribers were dropped.
    pub fn close_all(&self) -> usize {
        let mut members = self.inner.members.lock();
        members.closed = true;
        let dropped = members.by_id.len();
        members.by_id.clear();
        members.pruned.clear();
        drop(members);

        info!(dropped, "Connection registry closed");
        dropped
    }
}
