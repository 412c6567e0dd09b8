use std::env;

use anyhow::Context;
use tandem::server::{self, ServerState};
use tandem::settings::resolve_relay_addr;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = resolve_relay_addr(|k| env::var(k).ok());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind relay on {addr}"))?;
    let port = listener.local_addr()?.port();

    match server::lan_ip() {
        Some(ip) => log::info!("relay listening on {addr}; LAN address http://{ip}:{port}"),
        None => log::info!("relay listening on {addr}; no LAN address found"),
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutting down relay");
        }
        let _ = shutdown_tx.send(());
    });

    server::serve(listener, ServerState::new(port), shutdown_rx)
        .await
        .context("serve relay")
}
