//! Frames of the change-feed WebSocket protocol.
//!
//! Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};

use super::ChangeEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Sent by the client right after connecting. An empty list means all
    /// tables.
    Subscribe {
        #[serde(default)]
        tables: Vec<String>,
    },
    /// Server acknowledgement that completes the handshake.
    Subscribed {
        #[serde(default)]
        tables: Vec<String>,
    },
    Change(ChangeEvent),
    /// Terminal error; the server closes the connection after sending it.
    Error { message: String },
}

impl FeedMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
