use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChannelMessage, Message};

/// Events pushed over the `/socket` connection.
///
/// Frames are JSON text: `{"event": "newMessage", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// A message was created and the receiving account is connected
    NewMessage(NewMessage),

    /// Every account identifier with a live connection, sent on each connect/disconnect
    GetOnlineUsers(Vec<Uuid>),
}

/// Payload of `newMessage`: the created record, exactly as the REST
/// endpoint returned it to the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NewMessage {
    Direct(Message),
    Channel(ChannelMessage),
}

impl NewMessage {
    pub fn sender_id(&self) -> Uuid {
        match self {
            Self::Direct(m) => m.sender_id,
            Self::Channel(m) => m.sender.id,
        }
    }

    /// The channel this message was posted to, `None` for personal messages.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct(_) => None,
            Self::Channel(m) => Some(m.channel_id),
        }
    }
}
