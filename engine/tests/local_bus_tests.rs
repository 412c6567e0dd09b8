use std::net::SocketAddr;
use std::time::Duration;

use tandem_engine::local_channel::{LocalChannel, LocalHub};
use tokio::sync::oneshot;

fn free_bus_addr() -> SocketAddr {
    let vacant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    vacant.local_addr().unwrap()
}

async fn wait_for_listeners(channel: &LocalChannel<String>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while channel.listeners() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{:?} never saw {count} listeners", channel.name()));
}

async fn recv_within(channel: &mut LocalChannel<String>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(2), channel.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn separately_built_hubs_share_a_channel() {
    let bus = free_bus_addr();
    let mut display = LocalHub::<String>::same_device(bus).open("ctl");
    let mut controller = LocalHub::<String>::same_device(bus).open("ctl");
    wait_for_listeners(&display, 1).await;
    wait_for_listeners(&controller, 1).await;

    assert_eq!(controller.post("moveLeft".to_string()), 1);
    assert_eq!(recv_within(&mut display).await.as_deref(), Some("moveLeft"));

    display.post("status".to_string());
    assert_eq!(recv_within(&mut controller).await.as_deref(), Some("status"));

    let echo = tokio::time::timeout(Duration::from_millis(100), display.recv()).await;
    assert!(echo.is_err(), "poster heard its own message");
}

#[tokio::test]
async fn listener_count_follows_joins_and_leaves() {
    let bus = free_bus_addr();
    let first = LocalHub::<String>::same_device(bus).open("ctl");
    let second = LocalHub::<String>::same_device(bus).open("ctl");
    let third = LocalHub::<String>::same_device(bus).open("ctl");
    wait_for_listeners(&first, 2).await;

    drop(third);
    wait_for_listeners(&first, 1).await;
    wait_for_listeners(&second, 1).await;
}

#[tokio::test]
async fn channel_names_keep_traffic_apart() {
    let bus = free_bus_addr();
    let hub = LocalHub::<String>::same_device(bus);
    let mut one_a = hub.open("one");
    let one_b = LocalHub::<String>::same_device(bus).open("one");
    let mut two = LocalHub::<String>::same_device(bus).open("two");
    wait_for_listeners(&one_a, 1).await;
    wait_for_listeners(&two, 0).await;

    one_b.post("hello".to_string());
    assert_eq!(recv_within(&mut one_a).await.as_deref(), Some("hello"));
    assert_eq!(two.try_recv(), None);
    assert_eq!(two.listeners(), 0);
}

#[tokio::test]
async fn survivor_takes_over_when_the_host_leaves() {
    let bus = free_bus_addr();
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    // The first endpoint lives on its own runtime so that dropping the runtime
    // takes the bus host down with it.
    let host = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let _first = LocalHub::<String>::same_device(bus).open("ctl");
            while tokio::net::TcpStream::connect(bus).await.is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let _ = ready_tx.send(());
            let _ = stop_rx.await;
        });
    });

    ready_rx.await.unwrap();
    let mut survivor = LocalHub::<String>::same_device(bus).open("ctl");
    wait_for_listeners(&survivor, 1).await;

    stop_tx.send(()).unwrap();
    tokio::task::spawn_blocking(move || host.join())
        .await
        .unwrap()
        .unwrap();

    let newcomer = LocalHub::<String>::same_device(bus).open("ctl");
    wait_for_listeners(&newcomer, 1).await;
    newcomer.post("after takeover".to_string());
    assert_eq!(
        recv_within(&mut survivor).await.as_deref(),
        Some("after takeover")
    );
}
