//! HTTP surface and the WebSocket relay.

use std::{
    io,
    net::{IpAddr, UdpSocket},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use engine::relay::{PeerId, Relay};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct ServerState {
    relay: Arc<Relay<Message>>,
    port: u16,
}

impl ServerState {
    pub fn new(port: u16) -> Self {
        Self {
            relay: Arc::new(Relay::new()),
            port,
        }
    }

    pub fn relay(&self) -> &Relay<Message> {
        &self.relay
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(rename = "localIP")]
    pub local_ip: Option<String>,
    pub port: u16,
    pub connection_url: Option<String>,
}

impl NetworkInfo {
    pub fn new(local_ip: Option<IpAddr>, port: u16) -> Self {
        Self {
            local_ip: local_ip.map(|ip| ip.to_string()),
            port,
            connection_url: local_ip.map(|ip| match ip {
                IpAddr::V4(v4) => format!("http://{v4}:{port}"),
                IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
            }),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/network-info", get(network_info))
        .route("/ws", get(relay_upgrade))
        .with_state(state)
        .layer(cors)
}

/// Serve until `shutdown` fires (or forever if it is never sent).
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    shutdown: oneshot::Receiver<()>,
) -> io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "relay is up".to_string(),
    })
}

async fn network_info(State(state): State<ServerState>) -> Json<NetworkInfo> {
    Json(NetworkInfo::new(lan_ip(), state.port))
}

/// The address other devices on the LAN would use to reach this machine.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface.
pub fn lan_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

async fn relay_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    let relay = Arc::clone(&state.relay);
    ws.on_upgrade(move |socket| relay_socket(socket, relay))
}

async fn relay_socket(socket: WebSocket, relay: Arc<Relay<Message>>) {
    let (peer, mut outbound) = relay.connect();
    log::info!("relay peer {peer} joined ({} connected)", relay.peer_count());
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                forward(&relay, peer, message);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                log::debug!("relay peer {peer} read error: {err}");
                break;
            }
        }
    }

    relay.disconnect(peer);
    writer.abort();
    log::info!("relay peer {peer} left ({} connected)", relay.peer_count());
}

fn forward(relay: &Relay<Message>, from: PeerId, message: Message) {
    let delivered = relay.broadcast_from(from, message);
    log::debug!("relay peer {from}: forwarded to {delivered} peers");
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn network_info_without_lan_ip_has_no_url() {
        let info = NetworkInfo::new(None, 3000);
        assert_eq!(info.local_ip, None);
        assert_eq!(info.connection_url, None);
        assert_eq!(info.port, 3000);
    }

    #[test]
    fn network_info_serializes_local_ip_key() {
        let info = NetworkInfo::new(Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))), 3000);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["localIP"], "192.168.1.20");
        assert_eq!(json["connectionUrl"], "http://192.168.1.20:3000");
        assert_eq!(json["port"], 3000);
    }
}
