//! Wire shapes shared by the relay link and the local channel.

use serde::{Deserialize, Serialize};

use crate::action::Action;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown action tag: {0}")]
    UnknownAction(String),
}

/// Single-field action event, e.g. `{"action":"moveLeft"}`.
///
/// The tag is kept as a raw string so unknown tags can be reported instead of
/// failing the whole decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action: String,
}

impl ActionEvent {
    pub fn new(action: Action) -> Self {
        Self {
            action: action.tag().to_string(),
        }
    }
}

/// Coarse run status pushed from the display to controllers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub is_running: bool,
    pub is_paused: bool,
    pub is_game_over: bool,
}

impl RunState {
    /// Running, not paused and not over: the only state in which pieces move.
    pub fn is_live(self) -> bool {
        self.is_running && !self.is_paused && !self.is_game_over
    }
}

/// Everything that travels over the local channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    Action { action: Action },
    RunState(RunState),
}

pub fn encode_action(action: Action) -> String {
    // Tags are fixed camelCase identifiers, so no escaping is needed.
    format!("{{\"action\":\"{}\"}}", action.tag())
}

pub fn decode_action(text: &str) -> Result<Action, ProtocolError> {
    let event: ActionEvent = serde_json::from_str(text)?;
    event.action.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_event_is_a_single_string_field() {
        assert_eq!(encode_action(Action::MoveLeft), r#"{"action":"moveLeft"}"#);
        assert_eq!(encode_action(Action::HardDrop), r#"{"action":"hardDrop"}"#);
    }

    #[test]
    fn encoded_events_match_the_serde_shape() {
        for action in Action::ALL {
            let encoded = encode_action(action);
            let parsed: ActionEvent = serde_json::from_str(&encoded).unwrap();
            assert_eq!(parsed, ActionEvent::new(action));
            assert_eq!(encoded, serde_json::to_string(&parsed).unwrap());
        }
    }

    #[test]
    fn decode_accepts_down_alias() {
        assert_eq!(decode_action(r#"{"action":"down"}"#).unwrap(), Action::SoftDrop);
    }

    #[test]
    fn decode_rejects_unknown_and_malformed() {
        assert!(matches!(
            decode_action(r#"{"action":"fly"}"#),
            Err(ProtocolError::UnknownAction(_))
        ));
        assert!(matches!(
            decode_action("moveLeft"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn run_state_uses_camel_case_fields() {
        let json = serde_json::to_string(&RunState {
            is_running: true,
            is_paused: false,
            is_game_over: false,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"isRunning":true,"isPaused":false,"isGameOver":false}"#
        );
    }

    #[test]
    fn control_message_is_type_tagged() {
        let msg = ControlMessage::Action {
            action: Action::Rotate,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"action","action":"rotate"}"#
        );

        let parsed: ControlMessage = serde_json::from_str(
            r#"{"type":"runState","isRunning":true,"isPaused":true,"isGameOver":false}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ControlMessage::RunState(RunState {
                is_running: true,
                is_paused: true,
                is_game_over: false,
            })
        );
    }
}
