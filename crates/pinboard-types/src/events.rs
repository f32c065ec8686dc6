use serde::{Deserialize, Serialize};

use crate::models::{ChatView, Message, Notification, UserId};

/// Frames pushed over the `/socket` websocket. Each is one JSON text frame
/// discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushEvent {
    /// Snapshot of the whole inbox, sent right after the socket binds.
    AllNotifications {
        #[serde(rename = "allNotifications")]
        all_notifications: Vec<Notification>,
    },

    Notification { notification: Notification },

    /// Snapshot of every chat the user takes part in.
    AllChats {
        #[serde(rename = "allChats")]
        all_chats: Vec<ChatView>,
    },

    /// First message of a chat that did not exist before.
    NewChat { chat: ChatView },

    NewMessage { message: Message },
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AllNotifications { .. } => "all-notifications",
            Self::Notification { .. } => "notification",
            Self::AllChats { .. } => "all-chats",
            Self::NewChat { .. } => "new-chat",
            Self::NewMessage { .. } => "new-message",
        }
    }
}

/// First frame a client sends after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub user_id: UserId,
    #[serde(default)]
    pub csrf_token: String,
}
