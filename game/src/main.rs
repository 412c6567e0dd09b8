use std::{
    env,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::local_channel::LocalHub;
use tandem::{
    action::Action,
    controller::{Controller, action_for_key, action_for_touch},
    display_host::DisplayHost,
    protocol::ControlMessage,
    relay_link::RelayLink,
    settings::{
        DEFAULT_CHANNEL_NAME, PreferenceStore, resolve_local_bus_addr, resolve_relay_url,
    },
    view::render_text,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::oneshot,
};

#[derive(Debug, Parser)]
#[command(name = "tandem", about = "Falling-block puzzle driven from a second device")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the run and print the board whenever it changes.
    Display {
        /// Relay WebSocket URL (defaults to TANDEM_RELAY_URL).
        #[arg(long)]
        relay: Option<String>,
        /// Skip the relay and listen on the local channel only.
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Read keys from stdin, one per line, and send them to the display.
    Controller {
        #[arg(long)]
        relay: Option<String>,
    },
    /// Controller and display in one process sharing a local channel.
    Local {
        /// Also send every action to this relay.
        #[arg(long)]
        relay: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Display {
            relay,
            offline,
            seed,
        } => {
            let link = if offline {
                None
            } else {
                connect_relay(&relay_url(relay)).await
            };
            run_display(link, seed).await
        }
        Command::Controller { relay } => {
            let link = connect_relay(&relay_url(relay)).await;
            if link.is_none() {
                log::warn!("no relay: only displays on this device will hear the controller");
            }
            let hub = local_hub();
            let controller = build_controller(&hub, link);
            read_keys(controller).await
        }
        Command::Local { relay, seed } => {
            let link = match relay {
                Some(url) => connect_relay(&url).await,
                None => None,
            };
            run_local(link, seed).await
        }
    }
}

fn relay_url(flag: Option<String>) -> String {
    flag.unwrap_or_else(|| resolve_relay_url(|k| env::var(k).ok()))
}

/// Shares the local channel with every other `tandem` process on this device.
fn local_hub() -> LocalHub<ControlMessage> {
    let bus = resolve_local_bus_addr(|k| env::var(k).ok());
    log::debug!("local channel bus at {bus}");
    LocalHub::same_device(bus)
}

fn seed_or_clock(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    })
}

/// A missing relay is not fatal; the local channel keeps working.
async fn connect_relay(url: &str) -> Option<RelayLink> {
    match RelayLink::connect(url).await {
        Ok(link) => Some(link),
        Err(err) => {
            log::warn!("{err}; continuing without the relay");
            None
        }
    }
}

fn build_controller(hub: &LocalHub<ControlMessage>, link: Option<RelayLink>) -> Controller {
    let controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME));
    match link {
        Some(link) => controller.with_network(link.sender()),
        None => controller,
    }
}

fn spawn_renderer(host: &DisplayHost) {
    let mut snapshots = host.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            println!("{}", render_text(&snapshot));
        }
    });
}

async fn run_display(link: Option<RelayLink>, seed: Option<u64>) -> anyhow::Result<()> {
    let hub = local_hub();
    let host = DisplayHost::new(seed_or_clock(seed)).with_preferences(PreferenceStore::from_env());
    spawn_renderer(&host);

    // The sending half stays alive so the socket is not closed under us.
    let (_relay, network) = link.map(RelayLink::into_parts).unzip();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(host.run(hub.open(DEFAULT_CHANNEL_NAME), network, shutdown_rx));

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    let _ = shutdown_tx.send(());
    let host = task.await.context("display host task")?;
    log::info!("high score {}", host.high_score());
    Ok(())
}

async fn run_local(link: Option<RelayLink>, seed: Option<u64>) -> anyhow::Result<()> {
    let hub = local_hub();
    let host = DisplayHost::new(seed_or_clock(seed)).with_preferences(PreferenceStore::from_env());
    spawn_renderer(&host);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(host.run(hub.open(DEFAULT_CHANNEL_NAME), None, shutdown_rx));

    let controller = build_controller(&hub, link);
    let result = read_keys(controller).await;

    let _ = shutdown_tx.send(());
    let host = task.await.context("display host task")?;
    log::info!("high score {}", host.high_score());
    result
}

fn action_for_line(line: &str) -> Option<Action> {
    match line {
        "space" => Some(Action::HardDrop),
        "enter" => Some(Action::Start),
        _ => action_for_touch(line)
            .or_else(|| action_for_key(line))
            .or_else(|| Action::from_tag(line)),
    }
}

async fn read_keys(mut controller: Controller) -> anyhow::Result<()> {
    println!("keys: left right rotate down drop pause start restart (or a/d/w/s, p, r); quit to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let line = line.trim();
        if line == "quit" {
            break;
        }
        let Some(action) = action_for_line(line) else {
            if !line.is_empty() {
                println!("unknown key {line:?}");
            }
            continue;
        };

        let delivery = controller.dispatch(action);
        // Give the display a moment to post its run state back.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let now = Instant::now();
        controller.poll(now);
        let badge = controller.badge(now);
        println!(
            "{action}: relay {} local {} [{}]",
            if delivery.network { "sent" } else { "-" },
            if delivery.local { "sent" } else { "-" },
            badge.label()
        );
    }
    Ok(())
}
