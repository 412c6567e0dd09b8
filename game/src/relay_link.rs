//! WebSocket client side of the relay, shared by controllers and displays.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::action::Action;
use crate::protocol::encode_action;
use crate::transport::{ActionTransport, TransportError};

/// Cloneable sending half of a relay connection.
#[derive(Debug, Clone)]
pub struct RelaySender {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl RelaySender {
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.outbound.is_closed()
    }
}

impl ActionTransport for RelaySender {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn is_connected(&self) -> bool {
        self.is_open()
    }

    fn send_action(&self, action: Action) -> Result<(), TransportError> {
        self.send_text(encode_action(action))
    }
}

/// A live connection to the relay. Text frames from other peers arrive on
/// the inbound queue untouched.
#[derive(Debug)]
pub struct RelayLink {
    sender: RelaySender,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl RelayLink {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source: Box::new(source),
            })?;
        log::info!("connected to relay at {url}");

        let (mut write, mut read) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<String>();
        let connected = Arc::new(AtomicBool::new(true));

        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = write.send(Message::Text(text)).await {
                    log::warn!("relay write failed: {err}");
                    break;
                }
            }
            writer_connected.store(false, Ordering::Relaxed);
            let _ = write.close().await;
        });

        let reader_connected = Arc::clone(&connected);
        let reader_url = url.to_string();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    // Send-only users drop the inbound queue; keep the socket alive.
                    Ok(Message::Text(text)) => {
                        let _ = inbound_tx.send(text);
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("relay read failed: {err}");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::Relaxed);
            log::info!("relay link to {reader_url} closed");
        });

        Ok(Self {
            sender: RelaySender {
                outbound,
                connected,
            },
            inbound,
        })
    }

    pub fn sender(&self) -> RelaySender {
        self.sender.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_open()
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn into_parts(self) -> (RelaySender, mpsc::UnboundedReceiver<String>) {
        (self.sender, self.inbound)
    }
}
