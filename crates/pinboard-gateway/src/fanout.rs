use std::sync::Arc;

use tracing::{info, warn};

use pinboard_types::models::{
    ChatId, MessageId, NotificationDraft, NotificationId, UserId, UserProfile,
};

use crate::chats::ChatStore;
use crate::error::{GatewayError, GatewayResult};
use crate::notifications::NotificationStore;

pub const DEFAULT_REPORT_THRESHOLD: i64 = 3;

/// Outcome of [`FanOut::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDelivery {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// True when this message opened the chat.
    pub new_chat: bool,
}

/// Turns domain events into store updates and pushes.
///
/// The store write comes first and is authoritative; the push is best
/// effort. A user who misses a push gets the full snapshot on reconnect.
pub struct FanOut {
    notifications: Arc<NotificationStore>,
    chats: Arc<ChatStore>,
    report_threshold: i64,
}

impl FanOut {
    pub fn new(
        notifications: Arc<NotificationStore>,
        chats: Arc<ChatStore>,
        report_threshold: i64,
    ) -> Self {
        Self {
            notifications,
            chats,
            report_threshold,
        }
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn chats(&self) -> &ChatStore {
        &self.chats
    }

    pub async fn new_follower(
        &self,
        follower: &UserProfile,
        followed: UserId,
    ) -> GatewayResult<NotificationId> {
        self.notify(NotificationDraft {
            user_id: followed,
            title: "New follower!".into(),
            category: "followers".into(),
            text: format!("You have received a new follower: {}", follower.username),
        })
        .await
    }

    pub async fn unfollowed(
        &self,
        follower: &UserProfile,
        followed: UserId,
    ) -> GatewayResult<NotificationId> {
        self.notify(NotificationDraft {
            user_id: followed,
            title: "Follower lost".into(),
            category: "followers".into(),
            text: format!("{} has unfollowed you", follower.username),
        })
        .await
    }

    /// Notifies the pin owner when the reports count reaches the threshold.
    /// Counts below or past it produce nothing.
    pub async fn pin_reported(
        &self,
        owner: UserId,
        pin_id: i64,
        pin_title: &str,
        reports_count: i64,
    ) -> GatewayResult<Option<NotificationId>> {
        if reports_count != self.report_threshold {
            return Ok(None);
        }

        info!(pin_id, owner, reports_count, "Pin reached report threshold");
        let id = self
            .notify(NotificationDraft {
                user_id: owner,
                title: "Your pin was reported".into(),
                category: "reports".into(),
                text: format!(
                    "Your pin \"{}\" has been reported {} times and is under review",
                    pin_title, reports_count
                ),
            })
            .await?;
        Ok(Some(id))
    }

    /// Appends `text` to the chat between `author` and `recipient`, opening
    /// it if needed. A chat this call did not see before goes out as
    /// `new-chat` to both sides, otherwise each side gets `new-message`.
    ///
    /// Two first messages racing each other both announce the chat in full,
    /// so neither side is sent a message for a chat it has not been shown.
    /// A caller that finds the chat already open relies on the creator's
    /// `new-chat` having gone out first; pushes from separate requests are
    /// not ordered against each other.
    pub async fn message(
        &self,
        author: UserId,
        recipient: UserId,
        text: &str,
    ) -> GatewayResult<MessageDelivery> {
        let (chat_id, new_chat, announce) = match self.chats.get_chat_by_users(author, recipient) {
            Some(chat) => (chat.chat_id, false, false),
            None => match self.chats.create_chat(author, recipient).await {
                Ok(chat_id) => (chat_id, true, true),
                // Opened concurrently by another request.
                Err(GatewayError::ChatAlreadyExists(chat_id)) => (chat_id, false, true),
                Err(e) => return Err(e),
            },
        };

        let message = self.chats.add_message(chat_id, author, text)?;

        for user_id in [author, recipient] {
            let pushed = if announce {
                self.chats.send_chat(chat_id, user_id).await
            } else {
                self.chats
                    .send_message(chat_id, message.message_id, user_id)
                    .await
            };
            if let Err(e) = pushed {
                warn!(chat_id, user_id, "Chat push dropped: {}", e);
            }
        }

        Ok(MessageDelivery {
            chat_id,
            message_id: message.message_id,
            new_chat,
        })
    }

    /// Recovery path after a socket binds: full inbox, then every chat.
    pub async fn connected(&self, user_id: UserId) -> GatewayResult<()> {
        self.notifications.send_all(user_id).await?;
        self.chats.send_all_chats(user_id).await
    }

    async fn notify(&self, draft: NotificationDraft) -> GatewayResult<NotificationId> {
        let user_id = draft.user_id;
        let id = self.notifications.add(draft).await?;
        if let Err(e) = self.notifications.send_one(user_id, id).await {
            warn!(user_id, id, "Notification push dropped: {}", e);
        }
        Ok(id)
    }
}
