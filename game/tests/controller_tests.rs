use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use engine::local_channel::LocalHub;
use tandem::action::Action;
use tandem::controller::{Badge, Controller, Delivery, RUN_STATE_STALE_AFTER};
use tandem::protocol::{ControlMessage, RunState};
use tandem::settings::DEFAULT_CHANNEL_NAME;
use tandem::transport::{ActionTransport, TransportError};

#[derive(Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Action>>>,
    down: bool,
}

impl RecordingTransport {
    fn down() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Action> {
        self.sent.lock().unwrap().clone()
    }
}

impl ActionTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_connected(&self) -> bool {
        !self.down
    }

    fn send_action(&self, action: Action) -> Result<(), TransportError> {
        if self.down {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(action);
        Ok(())
    }
}

#[test]
fn dispatch_fires_both_legs() {
    let hub = LocalHub::in_process();
    let mut display = hub.open(DEFAULT_CHANNEL_NAME);
    let network = RecordingTransport::default();
    let controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME)).with_network(network.clone());

    let delivery = controller.dispatch(Action::Rotate);

    assert_eq!(
        delivery,
        Delivery {
            local: true,
            network: true
        }
    );
    assert_eq!(network.sent(), vec![Action::Rotate]);
    assert_eq!(
        display.try_recv(),
        Some(ControlMessage::Action {
            action: Action::Rotate
        })
    );
}

#[test]
fn local_leg_survives_a_dead_relay() {
    let hub = LocalHub::in_process();
    let mut display = hub.open(DEFAULT_CHANNEL_NAME);
    let controller =
        Controller::new(hub.open(DEFAULT_CHANNEL_NAME)).with_network(RecordingTransport::down());

    assert!(!controller.network_connected());
    let delivery = controller.dispatch(Action::HardDrop);

    assert!(delivery.local);
    assert!(!delivery.network);
    assert!(display.try_recv().is_some());
}

#[test]
fn relay_leg_survives_an_empty_local_channel() {
    let hub = LocalHub::in_process();
    let network = RecordingTransport::default();
    let controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME)).with_network(network.clone());

    let delivery = controller.dispatch(Action::Start);

    assert!(!delivery.local);
    assert!(delivery.network);
    assert_eq!(network.sent(), vec![Action::Start]);
}

#[test]
fn keys_and_touch_buttons_dispatch_mapped_actions() {
    let hub = LocalHub::in_process();
    let _display = hub.open(DEFAULT_CHANNEL_NAME);
    let network = RecordingTransport::default();
    let controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME)).with_network(network.clone());

    assert!(controller.on_key("ArrowLeft").is_some());
    assert!(controller.on_touch("drop").is_some());
    assert!(controller.on_key("F1").is_none());
    assert!(controller.on_touch("jump").is_none());

    assert_eq!(network.sent(), vec![Action::MoveLeft, Action::HardDrop]);
}

#[test]
fn badge_follows_the_latest_run_state_until_it_goes_stale() {
    let hub = LocalHub::in_process();
    let display = hub.open(DEFAULT_CHANNEL_NAME);
    let mut controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME));
    let t0 = Instant::now();

    assert_eq!(controller.badge(t0), Badge::Offline);

    display.post(ControlMessage::RunState(RunState::default()));
    display.post(ControlMessage::RunState(RunState {
        is_running: true,
        is_paused: true,
        is_game_over: false,
    }));
    let seen = controller.poll(t0);

    assert_eq!(seen.map(|s| s.is_paused), Some(true));
    assert_eq!(controller.badge(t0), Badge::Paused);
    assert_eq!(controller.badge(t0 + RUN_STATE_STALE_AFTER), Badge::Paused);
    assert_eq!(
        controller.badge(t0 + RUN_STATE_STALE_AFTER + Duration::from_millis(1)),
        Badge::Offline
    );
}

#[test]
fn controller_ignores_action_echoes_from_other_controllers() {
    let hub = LocalHub::in_process();
    let other = hub.open(DEFAULT_CHANNEL_NAME);
    let mut controller = Controller::new(hub.open(DEFAULT_CHANNEL_NAME));
    let now = Instant::now();

    other.post(ControlMessage::Action {
        action: Action::Pause,
    });

    assert_eq!(controller.poll(now), None);
    assert_eq!(controller.badge(now), Badge::Offline);
}
