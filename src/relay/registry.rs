//! Connected client registry.
//!
//! Holds one bounded write queue per client plus the cached initial frame.
//! Registration and broadcast run under the same lock, so a client
//! registered after the first upstream frame always sees that frame first.
//!
//! Removing a client from the registry, for any reason, resolves its
//! [`ClientQueue::evicted`] signal so a task stuck writing to a stalled
//! socket can give up.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

/// Client identifier, unique for the relay's lifetime.
pub type ClientId = u64;

/// Receiving side of one client's registration.
#[derive(Debug)]
pub struct ClientQueue {
    /// Encoded frames to write to the client
    pub frames: mpsc::Receiver<Bytes>,
    /// Resolves once the client is no longer registered
    pub evicted: oneshot::Receiver<()>,
}

#[derive(Debug)]
struct Slot {
    frames: mpsc::Sender<Bytes>,
    // Dropped with the slot, which wakes `ClientQueue::evicted`.
    _evict: oneshot::Sender<()>,
}

/// Registry of client write queues.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Slot>,
    initial: Option<Bytes>,
    next_id: ClientId,
    closed: bool,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client with a queue of `capacity` encoded frames.
    ///
    /// The cached initial frame, if any, is queued before anything else.
    /// Returns `None` once the registry is closed.
    pub fn register(&mut self, capacity: usize) -> Option<(ClientId, ClientQueue)> {
        if self.closed {
            return None;
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if let Some(initial) = &self.initial {
            // Fresh queue with capacity >= 1.
            let _ = tx.try_send(initial.clone());
        }
        let (evict_tx, evict_rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(
            id,
            Slot {
                frames: tx,
                _evict: evict_tx,
            },
        );
        Some((
            id,
            ClientQueue {
                frames: rx,
                evicted: evict_rx,
            },
        ))
    }

    /// Remove a client. Returns whether it was present.
    pub fn remove(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Queue an encoded frame for every client.
    ///
    /// The first frame ever broadcast becomes the initial frame. Clients
    /// whose queue is full are removed and returned; clients whose task
    /// already ended are removed silently.
    pub fn broadcast(&mut self, frame: Bytes) -> Vec<ClientId> {
        if self.initial.is_none() {
            self.initial = Some(frame.clone());
        }

        let mut overflowed = Vec::new();
        self.clients.retain(|&id, slot| match slot.frames.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                overflowed.push(id);
                false
            },
            Err(TrySendError::Closed(_)) => false,
        });
        overflowed
    }

    /// Drop every queue and refuse further registrations.
    pub fn close(&mut self) {
        self.closed = true;
        self.clients.clear();
    }

    /// Whether [`ClientRegistry::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cached initial frame.
    pub fn initial_frame(&self) -> Option<&Bytes> {
        self.initial.as_ref()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
