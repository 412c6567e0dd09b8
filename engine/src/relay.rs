//! Connection registry with fan-out to every peer except the sender.
//!
//! The relay never looks inside a payload and keeps nothing once it has been
//! handed to the peers' outbound queues.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc;

pub type PeerId = u64;

#[derive(Debug)]
pub struct Relay<T> {
    peers: Mutex<HashMap<PeerId, mpsc::UnboundedSender<T>>>,
    next_peer: AtomicU64,
}

impl<T: Clone> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Relay<T> {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_peer: AtomicU64::new(1),
        }
    }

    /// Register a peer. Payloads from other peers arrive on the returned receiver.
    pub fn connect(&self) -> (PeerId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        self.lock_peers().insert(id, tx);
        (id, rx)
    }

    pub fn disconnect(&self, peer: PeerId) -> bool {
        self.lock_peers().remove(&peer).is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.lock_peers().len()
    }

    /// Hand `payload` to every connected peer. Returns how many took it.
    pub fn broadcast(&self, payload: T) -> usize {
        let mut peers = self.lock_peers();
        peers.retain(|_, tx| tx.send(payload.clone()).is_ok());
        peers.len()
    }

    /// Forward `payload` to every connected peer other than `from`.
    ///
    /// Peers whose queue has been dropped are pruned. Returns the number of
    /// peers the payload was handed to.
    pub fn broadcast_from(&self, from: PeerId, payload: T) -> usize {
        let mut peers = self.lock_peers();
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (&id, tx) in peers.iter() {
            if id == from {
                continue;
            }
            if tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(id);
            }
        }

        for id in gone {
            peers.remove(&id);
        }
        delivered
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, mpsc::UnboundedSender<T>>> {
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
