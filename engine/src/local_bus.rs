//! Same-device transport behind [`crate::local_channel::LocalHub::same_device`].
//!
//! Every process on the machine meets on one loopback TCP address. Whoever
//! binds it first hosts the bus; everyone else, the host's own endpoints
//! included, joins as a client. Frames are newline-delimited JSON. A client
//! names its channel once when it joins, and the host fans each message out to
//! the other members of that channel with [`Relay`], announcing the member
//! count whenever it changes. If the host goes away the survivors race to bind
//! the address again, so one of them takes over.

use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};

use crate::relay::Relay;

/// Pause between attempts to reach (or become) the bus host.
pub const REJOIN_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Frame<T> {
    Join { channel: String },
    Message { body: T },
    Members { count: usize },
}

/// One endpoint's handle on the bus; the connection lives in a background task.
#[derive(Debug)]
pub(crate) struct DeviceLink<T> {
    outbound: mpsc::UnboundedSender<T>,
    inbound: mpsc::UnboundedReceiver<T>,
    members: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl<T> Drop for DeviceLink<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> DeviceLink<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Must be called from inside a tokio runtime.
    pub(crate) fn join(bus: SocketAddr, channel: &str) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let members = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(endpoint_loop(
            bus,
            channel.to_string(),
            outbound_rx,
            inbound_tx,
            Arc::clone(&members),
        ));
        Self {
            outbound,
            inbound,
            members,
            task,
        }
    }
}

impl<T> DeviceLink<T> {
    pub(crate) fn listeners(&self) -> usize {
        self.members.load(Ordering::Relaxed).saturating_sub(1)
    }

    pub(crate) fn post(&self, message: T) {
        // Only fails once the endpoint task is gone, and then nobody is listening.
        let _ = self.outbound.send(message);
    }

    pub(crate) async fn recv(&mut self) -> Option<T> {
        self.inbound.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Option<T> {
        self.inbound.try_recv().ok()
    }
}

async fn endpoint_loop<T>(
    bus: SocketAddr,
    channel: String,
    mut outbound: mpsc::UnboundedReceiver<T>,
    inbound: mpsc::UnboundedSender<T>,
    members: Arc<AtomicUsize>,
) where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    loop {
        match join_bus(bus).await {
            Ok(stream) => {
                log::debug!("local bus {bus}: joined channel {channel:?}");
                let ended = session(stream, &channel, &mut outbound, &inbound, &members).await;
                members.store(0, Ordering::Relaxed);
                match ended {
                    Ok(()) => return,
                    Err(err) => log::warn!("local bus {bus}: lost channel {channel:?}: {err}"),
                }
            }
            Err(err) => log::debug!("local bus {bus}: cannot join: {err}"),
        }

        tokio::time::sleep(REJOIN_DELAY).await;
        // Posts made while off the bus are stale by now.
        loop {
            match outbound.try_recv() {
                Ok(_) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
    }
}

/// Host the bus if the address is free, then connect to it either way.
async fn join_bus(bus: SocketAddr) -> io::Result<TcpStream> {
    match TcpListener::bind(bus).await {
        Ok(listener) => {
            log::info!("hosting local bus on {bus}");
            tokio::spawn(host_bus(listener));
        }
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {}
        Err(err) => return Err(err),
    }
    TcpStream::connect(bus).await
}

/// Returns `Ok(())` when the endpoint was dropped, an error when the bus was lost.
async fn session<T>(
    stream: TcpStream,
    channel: &str,
    outbound: &mut mpsc::UnboundedReceiver<T>,
    inbound: &mpsc::UnboundedSender<T>,
    members: &AtomicUsize,
) -> io::Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write_frame(
        &mut write,
        &Frame::<T>::Join {
            channel: channel.to_string(),
        },
    )
    .await?;

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(body) => write_frame(&mut write, &Frame::Message { body }).await?,
                None => return Ok(()),
            },
            line = lines.next_line() => match line? {
                Some(line) => match serde_json::from_str::<Frame<T>>(&line) {
                    Ok(Frame::Message { body }) => {
                        let _ = inbound.send(body);
                    }
                    Ok(Frame::Members { count }) => members.store(count, Ordering::Relaxed),
                    Ok(Frame::Join { .. }) => {}
                    Err(err) => log::debug!("local bus: dropping frame: {err}"),
                },
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "bus host went away",
                    ));
                }
            },
        }
    }
}

async fn write_frame<W, F>(write: &mut W, frame: &F) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    F: Serialize,
{
    let mut line = serde_json::to_string(frame).map_err(io::Error::other)?;
    line.push('\n');
    write.write_all(line.as_bytes()).await
}

fn members_line(count: usize) -> String {
    format!("{{\"kind\":\"members\",\"count\":{count}}}\n")
}

#[derive(Debug, Default)]
struct BusHost {
    channels: Mutex<HashMap<String, Arc<Relay<String>>>>,
}

impl BusHost {
    fn relay_for(&self, channel: &str) -> Arc<Relay<String>> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(channels.entry(channel.to_string()).or_default())
    }

    async fn serve(self: Arc<Self>, stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let channel = match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<Frame<serde::de::IgnoredAny>>(&line) {
                Ok(Frame::Join { channel }) => channel,
                _ => {
                    log::debug!("local bus: client did not join a channel");
                    return;
                }
            },
            _ => return,
        };

        let relay = self.relay_for(&channel);
        let (member, mut queue) = relay.connect();
        relay.broadcast(members_line(relay.peer_count()));

        let writer = tokio::spawn(async move {
            while let Some(line) = queue.recv().await {
                if write.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        while let Ok(Some(line)) = lines.next_line().await {
            relay.broadcast_from(member, format!("{line}\n"));
        }

        relay.disconnect(member);
        writer.abort();
        relay.broadcast(members_line(relay.peer_count()));
    }
}

async fn host_bus(listener: TcpListener) {
    let host = Arc::new(BusHost::default());
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(Arc::clone(&host).serve(stream));
            }
            Err(err) => log::warn!("local bus accept failed: {err}"),
        }
    }
}
