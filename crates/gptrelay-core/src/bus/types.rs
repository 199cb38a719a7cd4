//! Bus event types: messages flowing between channels and the dispatcher.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::SessionKey;

/// A message received by a channel.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Channel name (e.g. "discord", "cli").
    pub channel: String,
    /// Author identifier within the channel.
    pub sender_id: String,
    /// Server (guild) the message was posted in.
    pub server_id: String,
    /// Chat/conversation identifier within the server.
    pub chat_id: String,
    /// Raw text content.
    pub content: String,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Channel-specific metadata (e.g. message_id, username).
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        server_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            server_id: server_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Key of the conversation this message belongs to.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.server_id, &self.chat_id)
    }

    /// Platform id of this message, when the channel recorded one.
    pub fn message_id(&self) -> Option<&str> {
        self.metadata.get("message_id").map(String::as_str)
    }
}

/// A reply from the dispatcher to a channel.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// Target channel name.
    pub channel: String,
    /// Target chat/conversation identifier.
    pub chat_id: String,
    /// Text content to send.
    pub content: String,
    /// Optional message ID to reply to.
    pub reply_to: Option<String>,
    /// Channel-specific metadata.
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
            metadata: HashMap::new(),
        }
    }

    /// Build the reply to an inbound message, in the same channel and chat.
    pub fn reply(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        let mut msg = OutboundMessage::new(&inbound.channel, &inbound.chat_id, content);
        msg.reply_to = inbound.message_id().map(String::from);
        msg
    }
}
