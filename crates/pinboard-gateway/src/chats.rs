use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use pinboard_types::events::PushEvent;
use pinboard_types::models::{ChatId, ChatView, Message, MessageId, UserId, UserProfile};

use crate::directory::{UserDirectory, require_profile, require_user};
use crate::error::{GatewayError, GatewayResult};
use crate::registry::ConnectionRegistry;

/// Snapshot of a chat. `user_a < user_b` always; the pair is unordered from
/// the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: ChatId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub read_a: bool,
    pub read_b: bool,
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        user_id == self.user_a || user_id == self.user_b
    }

    /// The counterpart of `user_id`, if they take part in this chat.
    pub fn other(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.user_a {
            Some(self.user_b)
        } else if user_id == self.user_b {
            Some(self.user_a)
        } else {
            None
        }
    }

    pub fn is_read_by(&self, user_id: UserId) -> Option<bool> {
        if user_id == self.user_a {
            Some(self.read_a)
        } else if user_id == self.user_b {
            Some(self.read_b)
        } else {
            None
        }
    }

    fn read_flag_mut(&mut self, user_id: UserId) -> Option<&mut bool> {
        if user_id == self.user_a {
            Some(&mut self.read_a)
        } else if user_id == self.user_b {
            Some(&mut self.read_b)
        } else {
            None
        }
    }

    fn view(&self, viewer: UserId, target: UserProfile) -> ChatView {
        ChatView {
            chat_id: self.chat_id,
            target,
            messages: self.messages.clone(),
            is_read: self.is_read_by(viewer).unwrap_or(false),
        }
    }
}

struct ChatRecord {
    chat: Chat,
    next_message_id: MessageId,
}

#[derive(Default)]
struct ChatIndex {
    next_chat_id: ChatId,
    chats: HashMap<ChatId, ChatRecord>,
    by_pair: HashMap<(UserId, UserId), ChatId>,
    by_user: HashMap<UserId, BTreeSet<ChatId>>,
}

fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Two-party chats, one per unordered pair of users.
///
/// One lock guards the chats, the pair index and the per-user index. Profile
/// lookups and pushes happen outside it, on snapshots.
pub struct ChatStore {
    directory: Arc<dyn UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    index: Mutex<ChatIndex>,
}

impl ChatStore {
    pub fn new(directory: Arc<dyn UserDirectory>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            directory,
            registry,
            index: Mutex::new(ChatIndex::default()),
        }
    }

    /// Opens the chat between `a` and `b`. Fails with `ChatAlreadyExists`
    /// (carrying the existing id) if the pair already has one, in either order.
    pub async fn create_chat(&self, a: UserId, b: UserId) -> GatewayResult<ChatId> {
        if a == b {
            return Err(GatewayError::SelfChat);
        }
        require_user(self.directory.as_ref(), a).await?;
        require_user(self.directory.as_ref(), b).await?;

        let key = pair_key(a, b);
        let mut index = self.lock();
        if let Some(&existing) = index.by_pair.get(&key) {
            return Err(GatewayError::ChatAlreadyExists(existing));
        }

        let chat_id = index.next_chat_id;
        index.next_chat_id += 1;
        index.chats.insert(
            chat_id,
            ChatRecord {
                chat: Chat {
                    chat_id,
                    user_a: key.0,
                    user_b: key.1,
                    read_a: true,
                    read_b: true,
                    messages: Vec::new(),
                },
                next_message_id: 0,
            },
        );
        index.by_pair.insert(key, chat_id);
        index.by_user.entry(key.0).or_default().insert(chat_id);
        index.by_user.entry(key.1).or_default().insert(chat_id);

        debug!(chat_id, user_a = key.0, user_b = key.1, "Chat created");
        Ok(chat_id)
    }

    pub fn get_chat_by_users(&self, a: UserId, b: UserId) -> Option<Chat> {
        let index = self.lock();
        let chat_id = index.by_pair.get(&pair_key(a, b))?;
        index.chats.get(chat_id).map(|record| record.chat.clone())
    }

    pub fn get_chat_by_id(&self, chat_id: ChatId) -> GatewayResult<Chat> {
        self.lock()
            .chats
            .get(&chat_id)
            .map(|record| record.chat.clone())
            .ok_or(GatewayError::ChatNotFound(chat_id))
    }

    /// Every chat `user_id` takes part in, oldest first.
    pub fn chats_for(&self, user_id: UserId) -> Vec<Chat> {
        let index = self.lock();
        index
            .by_user
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| index.chats.get(id))
                    .map(|record| record.chat.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appends a message. The author has now seen the chat; the other side
    /// has not.
    pub fn add_message(&self, chat_id: ChatId, author_id: UserId, text: &str) -> GatewayResult<Message> {
        let mut index = self.lock();
        let record = index
            .chats
            .get_mut(&chat_id)
            .ok_or(GatewayError::ChatNotFound(chat_id))?;

        let Some(recipient) = record.chat.other(author_id) else {
            return Err(GatewayError::NotParticipant {
                chat_id,
                user_id: author_id,
            });
        };

        let message = Message {
            message_id: record.next_message_id,
            chat_id,
            author_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        record.next_message_id += 1;
        record.chat.messages.push(message.clone());

        if let Some(flag) = record.chat.read_flag_mut(author_id) {
            *flag = true;
        }
        if let Some(flag) = record.chat.read_flag_mut(recipient) {
            *flag = false;
        }

        Ok(message)
    }

    /// Marks the chat read for `user_id`.
    pub fn read_chat(&self, chat_id: ChatId, user_id: UserId) -> GatewayResult<()> {
        let mut index = self.lock();
        let record = index
            .chats
            .get_mut(&chat_id)
            .ok_or(GatewayError::ChatNotFound(chat_id))?;

        let flag = record
            .chat
            .read_flag_mut(user_id)
            .ok_or(GatewayError::NotParticipant { chat_id, user_id })?;
        if *flag {
            return Err(GatewayError::AlreadyRead);
        }
        *flag = true;
        Ok(())
    }

    /// The chat as `user_id` sees it, with the counterpart's profile as target.
    pub async fn view_for(&self, chat_id: ChatId, user_id: UserId) -> GatewayResult<ChatView> {
        let chat = self.get_chat_by_id(chat_id)?;
        let other = chat
            .other(user_id)
            .ok_or(GatewayError::NotParticipant { chat_id, user_id })?;
        let target = require_profile(self.directory.as_ref(), other).await?;
        Ok(chat.view(user_id, target))
    }

    /// Views of every chat of `user_id`. Chats whose counterpart is gone
    /// from the directory are left out.
    pub async fn views_for(&self, user_id: UserId) -> GatewayResult<Vec<ChatView>> {
        let mut views = Vec::new();
        for chat in self.chats_for(user_id) {
            let Some(other) = chat.other(user_id) else {
                continue;
            };
            match self.directory.profile(other).await? {
                Some(target) => views.push(chat.view(user_id, target)),
                None => debug!(chat_id = chat.chat_id, other, "Skipping chat with missing user"),
            }
        }
        Ok(views)
    }

    /// Pushes a `new-chat` frame describing the chat to `user_id`.
    pub async fn send_chat(&self, chat_id: ChatId, user_id: UserId) -> GatewayResult<()> {
        let chat = self.view_for(chat_id, user_id).await?;
        self.push(user_id, &PushEvent::NewChat { chat }).await
    }

    pub async fn send_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        user_id: UserId,
    ) -> GatewayResult<()> {
        let message = {
            let index = self.lock();
            let record = index
                .chats
                .get(&chat_id)
                .ok_or(GatewayError::ChatNotFound(chat_id))?;
            if !record.chat.has_participant(user_id) {
                return Err(GatewayError::NotParticipant { chat_id, user_id });
            }
            record
                .chat
                .messages
                .iter()
                .find(|m| m.message_id == message_id)
                .cloned()
                .ok_or(GatewayError::MessageNotFound {
                    chat_id,
                    message_id,
                })?
        };

        self.push(user_id, &PushEvent::NewMessage { message }).await
    }

    pub async fn send_all_chats(&self, user_id: UserId) -> GatewayResult<()> {
        let all_chats = self.views_for(user_id).await?;
        self.push(user_id, &PushEvent::AllChats { all_chats }).await
    }

    async fn push(&self, user_id: UserId, event: &PushEvent) -> GatewayResult<()> {
        match self.registry.send_event(user_id, event).await {
            Err(GatewayError::NotConnected(_)) => {
                debug!(user_id, kind = event.kind(), "Push skipped, user offline");
                Ok(())
            }
            Err(e) => {
                warn!(user_id, kind = event.kind(), "Chat push failed: {}", e);
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
