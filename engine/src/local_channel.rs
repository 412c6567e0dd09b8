//! Named fan-out channels.
//!
//! Every endpoint opened on a name hears what the others post on it, but never
//! its own posts. Nothing is buffered for endpoints opened later.
//!
//! A hub is either confined to this process ([`LocalHub::in_process`]) or
//! shared by every process on the machine ([`LocalHub::same_device`]).

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::local_bus::DeviceLink;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Envelope<T> {
    origin: u64,
    message: T,
}

#[derive(Debug)]
enum Backing<T> {
    InProcess {
        channels: Mutex<HashMap<String, broadcast::Sender<Envelope<T>>>>,
        capacity: usize,
    },
    Device {
        bus: SocketAddr,
    },
}

#[derive(Debug)]
struct HubInner<T> {
    backing: Backing<T>,
    next_endpoint: AtomicU64,
}

/// Registry of named channels. Cheap to clone; clones share the registry.
#[derive(Debug)]
pub struct LocalHub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for LocalHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for LocalHub<T> {
    fn default() -> Self {
        Self::in_process()
    }
}

impl<T> LocalHub<T> {
    /// Channels that only reach endpoints opened from this hub or its clones.
    pub fn in_process() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_backing(Backing::InProcess {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        })
    }

    /// Channels shared with every process that uses the same loopback `bus`
    /// address. Endpoints must be opened inside a tokio runtime.
    pub fn same_device(bus: SocketAddr) -> Self {
        Self::from_backing(Backing::Device { bus })
    }

    fn from_backing(backing: Backing<T>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                backing,
                next_endpoint: AtomicU64::new(1),
            }),
        }
    }

    pub fn bus_addr(&self) -> Option<SocketAddr> {
        match self.inner.backing {
            Backing::InProcess { .. } => None,
            Backing::Device { bus } => Some(bus),
        }
    }
}

impl<T> LocalHub<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Join the channel called `name`, creating it on first use.
    pub fn open(&self, name: &str) -> LocalChannel<T> {
        let id = self.inner.next_endpoint.fetch_add(1, Ordering::Relaxed);
        let link = match &self.inner.backing {
            Backing::InProcess { channels, capacity } => {
                let tx = channels
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .entry(name.to_string())
                    .or_insert_with(|| broadcast::channel(*capacity).0)
                    .clone();
                let rx = tx.subscribe();
                Link::InProcess { tx, rx }
            }
            Backing::Device { bus } => Link::Device(DeviceLink::join(*bus, name)),
        };
        log::debug!("local channel {name:?}: endpoint {id} joined");

        LocalChannel {
            name: name.to_string(),
            id,
            link,
        }
    }
}

#[derive(Debug)]
enum Link<T> {
    InProcess {
        tx: broadcast::Sender<Envelope<T>>,
        rx: broadcast::Receiver<Envelope<T>>,
    },
    Device(DeviceLink<T>),
}

/// One endpoint on a named channel.
#[derive(Debug)]
pub struct LocalChannel<T> {
    name: String,
    id: u64,
    link: Link<T>,
}

impl<T: Clone + Send + 'static> LocalChannel<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Endpoints other than this one currently listening on the channel.
    ///
    /// On a same-device hub this is the count last announced by the bus, and
    /// zero while the endpoint is not connected.
    pub fn listeners(&self) -> usize {
        match &self.link {
            Link::InProcess { tx, .. } => tx.receiver_count().saturating_sub(1),
            Link::Device(link) => link.listeners(),
        }
    }

    /// Deliver `message` to every other endpoint. Returns how many were listening.
    pub fn post(&self, message: T) -> usize {
        let listeners = self.listeners();
        match &self.link {
            Link::InProcess { tx, .. } => {
                // Our own receiver keeps the channel open, so send cannot fail here.
                let _ = tx.send(Envelope {
                    origin: self.id,
                    message,
                });
            }
            Link::Device(link) => link.post(message),
        }
        listeners
    }

    /// Wait for the next message posted by another endpoint.
    ///
    /// Returns `None` once the channel can no longer deliver anything.
    pub async fn recv(&mut self) -> Option<T> {
        let rx = match &mut self.link {
            Link::InProcess { rx, .. } => rx,
            Link::Device(link) => return link.recv().await,
        };
        loop {
            match rx.recv().await {
                Ok(envelope) if envelope.origin == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("local channel {:?}: dropped {skipped} messages", self.name);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`LocalChannel::recv`].
    pub fn try_recv(&mut self) -> Option<T> {
        let rx = match &mut self.link {
            Link::InProcess { rx, .. } => rx,
            Link::Device(link) => return link.try_recv(),
        };
        loop {
            match rx.try_recv() {
                Ok(envelope) if envelope.origin == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("local channel {:?}: dropped {skipped} messages", self.name);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
