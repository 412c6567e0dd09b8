use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::protocol::{ProtocolError, RunState};

/// The closed set of things a controller can ask the display to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Start,
    Pause,
    Restart,
    MoveLeft,
    MoveRight,
    Rotate,
    #[serde(alias = "down")]
    SoftDrop,
    HardDrop,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Start,
        Action::Pause,
        Action::Restart,
        Action::MoveLeft,
        Action::MoveRight,
        Action::Rotate,
        Action::SoftDrop,
        Action::HardDrop,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Restart => "restart",
            Action::MoveLeft => "moveLeft",
            Action::MoveRight => "moveRight",
            Action::Rotate => "rotate",
            Action::SoftDrop => "softDrop",
            Action::HardDrop => "hardDrop",
        }
    }

    /// Parse a wire tag. `"down"` is accepted as a soft-drop alias.
    pub fn from_tag(tag: &str) -> Option<Action> {
        match tag {
            "start" => Some(Action::Start),
            "pause" => Some(Action::Pause),
            "restart" => Some(Action::Restart),
            "moveLeft" => Some(Action::MoveLeft),
            "moveRight" => Some(Action::MoveRight),
            "rotate" => Some(Action::Rotate),
            "softDrop" | "down" => Some(Action::SoftDrop),
            "hardDrop" => Some(Action::HardDrop),
            _ => None,
        }
    }

    /// Whether a player-issued action has any effect given the run flags.
    pub fn is_accepted(self, flags: RunState) -> bool {
        match self {
            Action::Start | Action::Restart => true,
            Action::Pause => flags.is_running && !flags.is_game_over,
            Action::MoveLeft
            | Action::MoveRight
            | Action::Rotate
            | Action::SoftDrop
            | Action::HardDrop => flags.is_live(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::from_tag(s).ok_or_else(|| ProtocolError::UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: RunState = RunState {
        is_running: false,
        is_paused: false,
        is_game_over: false,
    };
    const LIVE: RunState = RunState {
        is_running: true,
        is_paused: false,
        is_game_over: false,
    };
    const PAUSED: RunState = RunState {
        is_running: true,
        is_paused: true,
        is_game_over: false,
    };
    const OVER: RunState = RunState {
        is_running: true,
        is_paused: false,
        is_game_over: true,
    };

    #[test]
    fn tags_round_trip_through_from_tag() {
        for action in Action::ALL {
            assert_eq!(Action::from_tag(action.tag()), Some(action));
        }
        assert_eq!(Action::from_tag("down"), Some(Action::SoftDrop));
        assert_eq!(Action::from_tag("hold"), None);
    }

    #[test]
    fn start_and_restart_are_always_accepted() {
        for flags in [IDLE, LIVE, PAUSED, OVER] {
            assert!(Action::Start.is_accepted(flags));
            assert!(Action::Restart.is_accepted(flags));
        }
    }

    #[test]
    fn pause_needs_a_live_or_paused_run() {
        assert!(!Action::Pause.is_accepted(IDLE));
        assert!(Action::Pause.is_accepted(LIVE));
        assert!(Action::Pause.is_accepted(PAUSED));
        assert!(!Action::Pause.is_accepted(OVER));
    }

    #[test]
    fn piece_actions_need_unpaused_running_run() {
        for action in [
            Action::MoveLeft,
            Action::MoveRight,
            Action::Rotate,
            Action::SoftDrop,
            Action::HardDrop,
        ] {
            assert!(action.is_accepted(LIVE), "{action}");
            assert!(!action.is_accepted(IDLE), "{action}");
            assert!(!action.is_accepted(PAUSED), "{action}");
            assert!(!action.is_accepted(OVER), "{action}");
        }
    }

    #[test]
    fn from_str_reports_unknown_tags() {
        let err = "jump".parse::<Action>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(tag) if tag == "jump"));
    }
}
