use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use tandem::action::Action;
use tandem::protocol::decode_action;
use tandem::relay_link::RelayLink;
use tandem::server::{self, HealthResponse, NetworkInfo, ServerState};
use tandem::transport::ActionTransport;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

async fn get_json<T: serde::de::DeserializeOwned>(state: ServerState, uri: &str) -> T {
    let response = server::router(state)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

struct RunningRelay {
    addr: SocketAddr,
    state: ServerState,
    shutdown: oneshot::Sender<()>,
}

impl RunningRelay {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = ServerState::new(addr.port());
        let (shutdown, shutdown_rx) = oneshot::channel();
        tokio::spawn(server::serve(listener, state.clone(), shutdown_rx));
        Self {
            addr,
            state,
            shutdown,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn wait_for_peers(&self, count: usize) {
        for _ in 0..200 {
            if self.state.relay().peer_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} peers, have {}",
            self.state.relay().peer_count()
        );
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let health: HealthResponse = get_json(ServerState::new(3000), "/api/health").await;
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn network_info_reports_the_listening_port() {
    let info: NetworkInfo = get_json(ServerState::new(4321), "/api/network-info").await;
    assert_eq!(info.port, 4321);
    if let Some(url) = info.connection_url {
        assert!(url.ends_with(":4321"));
    }
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let response = server::router(ServerState::new(3000))
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relay_forwards_to_everyone_but_the_sender() {
    let relay = RunningRelay::start().await;
    let (mut sender, _) = connect_async(relay.url()).await.unwrap();
    let (mut first, _) = connect_async(relay.url()).await.unwrap();
    let (mut second, _) = connect_async(relay.url()).await.unwrap();
    relay.wait_for_peers(3).await;

    let frame = r#"{"action":"moveLeft"}"#;
    sender.send(Message::Text(frame.to_string())).await.unwrap();

    for peer in [&mut first, &mut second] {
        let got = tokio::time::timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, Message::Text(frame.to_string()));
    }

    let echo = tokio::time::timeout(Duration::from_millis(100), sender.next()).await;
    assert!(echo.is_err(), "sender got its own frame back: {echo:?}");

    let _ = relay.shutdown.send(());
}

#[tokio::test]
async fn relay_link_carries_actions_between_peers() {
    let relay = RunningRelay::start().await;
    let controller = RelayLink::connect(&relay.url()).await.unwrap();
    let mut display = RelayLink::connect(&relay.url()).await.unwrap();
    relay.wait_for_peers(2).await;

    assert!(controller.is_connected());
    let sender = controller.sender();
    sender.send_action(Action::HardDrop).unwrap();

    let text = tokio::time::timeout(Duration::from_secs(2), display.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decode_action(&text).unwrap(), Action::HardDrop);

    drop(display);
    relay.wait_for_peers(1).await;
    let _ = relay.shutdown.send(());
}

#[tokio::test]
async fn connecting_to_a_closed_port_fails_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = RelayLink::connect(&format!("ws://{addr}/ws")).await.unwrap_err();
    assert!(err.to_string().contains(&addr.to_string()));
}
