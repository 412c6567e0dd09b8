use engine::local_channel::LocalChannel;

use crate::action::Action;
use crate::protocol::ControlMessage;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not reach relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("relay link is closed")]
    Closed,
    #[error("nobody is listening on local channel {0:?}")]
    NoListener(String),
}

/// One outbound path from a controller to a display.
pub trait ActionTransport {
    fn name(&self) -> &'static str;
    fn is_connected(&self) -> bool;
    fn send_action(&self, action: Action) -> Result<(), TransportError>;
}

impl ActionTransport for LocalChannel<ControlMessage> {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn send_action(&self, action: Action) -> Result<(), TransportError> {
        match self.post(ControlMessage::Action { action }) {
            0 => Err(TransportError::NoListener(
                LocalChannel::name(self).to_string(),
            )),
            _ => Ok(()),
        }
    }
}
