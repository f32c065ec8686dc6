use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Users are owned by the persistence layer; the real-time core only ever
/// sees their integer id.
pub type UserId = i64;

/// Per-user notification id, starting at 0.
pub type NotificationId = u64;

pub type ChatId = u64;

/// Per-chat message id, starting at 0.
pub type MessageId = u64;

/// Public view of a user, embedded in chat frames as the `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub avatar_path: String,
}

/// What a domain event hands to the notification store. Ids and the read
/// flag are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub user_id: UserId,
    pub title: String,
    pub category: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "ID")]
    pub id: NotificationId,
    #[serde(skip)]
    pub user_id: UserId,
    pub title: String,
    pub category: String,
    pub text: String,
    pub is_read: bool,
}

/// Messages are immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A chat as seen by one of its two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub chat_id: ChatId,
    pub target: UserProfile,
    pub messages: Vec<Message>,
    pub is_read: bool,
}
