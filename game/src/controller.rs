use std::time::{Duration, Instant};

use engine::local_channel::LocalChannel;

use crate::action::Action;
use crate::protocol::{ControlMessage, RunState};
use crate::transport::ActionTransport;

/// How long a run-state post counts as proof the display is alive.
pub const RUN_STATE_STALE_AFTER: Duration = Duration::from_millis(1500);

pub fn action_for_key(key: &str) -> Option<Action> {
    match key {
        "ArrowLeft" | "a" | "A" => Some(Action::MoveLeft),
        "ArrowRight" | "d" | "D" => Some(Action::MoveRight),
        "ArrowUp" | "w" | "W" => Some(Action::Rotate),
        "ArrowDown" | "s" | "S" => Some(Action::SoftDrop),
        " " | "Space" => Some(Action::HardDrop),
        "p" | "P" => Some(Action::Pause),
        "r" | "R" => Some(Action::Restart),
        "Enter" => Some(Action::Start),
        _ => None,
    }
}

pub fn action_for_touch(button: &str) -> Option<Action> {
    match button {
        "left" => Some(Action::MoveLeft),
        "right" => Some(Action::MoveRight),
        "rotate" => Some(Action::Rotate),
        "down" => Some(Action::SoftDrop),
        "drop" => Some(Action::HardDrop),
        "pause" => Some(Action::Pause),
        "start" => Some(Action::Start),
        "restart" => Some(Action::Restart),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Offline,
    Idle,
    Running,
    Paused,
    GameOver,
}

impl Badge {
    pub fn label(self) -> &'static str {
        match self {
            Badge::Offline => "Offline",
            Badge::Idle => "Idle",
            Badge::Running => "Running",
            Badge::Paused => "Paused",
            Badge::GameOver => "Game over",
        }
    }

    fn from_run_state(state: RunState) -> Self {
        if state.is_game_over {
            Badge::GameOver
        } else if state.is_paused {
            Badge::Paused
        } else if state.is_running {
            Badge::Running
        } else {
            Badge::Idle
        }
    }
}

/// Which legs an action actually left on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub local: bool,
    pub network: bool,
}

/// Turns input into actions and fires each one on both transports.
///
/// The two legs are independent: a failure on one is logged and never stops
/// the other.
pub struct Controller {
    local: LocalChannel<ControlMessage>,
    network: Option<Box<dyn ActionTransport + Send>>,
    last_run_state: Option<(RunState, Instant)>,
}

impl Controller {
    pub fn new(local: LocalChannel<ControlMessage>) -> Self {
        Self {
            local,
            network: None,
            last_run_state: None,
        }
    }

    pub fn with_network(mut self, network: impl ActionTransport + Send + 'static) -> Self {
        self.network = Some(Box::new(network));
        self
    }

    pub fn network_connected(&self) -> bool {
        self.network
            .as_ref()
            .is_some_and(|network| network.is_connected())
    }

    pub fn dispatch(&self, action: Action) -> Delivery {
        let mut delivery = Delivery::default();

        match self.network.as_deref() {
            Some(network) => match network.send_action(action) {
                Ok(()) => delivery.network = true,
                Err(err) => log::debug!("{} leg dropped {action}: {err}", network.name()),
            },
            None => log::debug!("no relay leg for {action}"),
        }

        match self.local.send_action(action) {
            Ok(()) => delivery.local = true,
            Err(err) => log::debug!("local leg dropped {action}: {err}"),
        }

        delivery
    }

    pub fn on_key(&self, key: &str) -> Option<Delivery> {
        action_for_key(key).map(|action| self.dispatch(action))
    }

    pub fn on_touch(&self, button: &str) -> Option<Delivery> {
        action_for_touch(button).map(|action| self.dispatch(action))
    }

    /// Drain pending local messages, keeping the newest run state.
    pub fn poll(&mut self, now: Instant) -> Option<RunState> {
        while let Some(message) = self.local.try_recv() {
            if let ControlMessage::RunState(state) = message {
                self.last_run_state = Some((state, now));
            }
        }
        self.run_state(now)
    }

    /// The last run state, if it is recent enough to trust.
    pub fn run_state(&self, now: Instant) -> Option<RunState> {
        self.last_run_state
            .filter(|(_, seen)| now.saturating_duration_since(*seen) <= RUN_STATE_STALE_AFTER)
            .map(|(state, _)| state)
    }

    pub fn badge(&self, now: Instant) -> Badge {
        self.run_state(now)
            .map_or(Badge::Offline, Badge::from_run_state)
    }
}
