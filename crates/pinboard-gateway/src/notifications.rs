use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use pinboard_types::events::PushEvent;
use pinboard_types::models::{Notification, NotificationDraft, NotificationId, UserId};

use crate::directory::{UserDirectory, require_user};
use crate::error::{GatewayError, GatewayResult};
use crate::registry::ConnectionRegistry;

#[derive(Default)]
struct Inbox {
    next_id: NotificationId,
    items: BTreeMap<NotificationId, Notification>,
}

/// Per-user inboxes. Ids are allocated per user, strictly increasing from 0,
/// and never reused while the inbox exists.
pub struct NotificationStore {
    directory: Arc<dyn UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    inboxes: Mutex<HashMap<UserId, Inbox>>,
}

impl NotificationStore {
    pub fn new(directory: Arc<dyn UserDirectory>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            directory,
            registry,
            inboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Appends an unread notification and returns its id. The user must
    /// exist; that is checked once, when their inbox is first created.
    pub async fn add(&self, draft: NotificationDraft) -> GatewayResult<NotificationId> {
        let known = self.lock().contains_key(&draft.user_id);
        if !known {
            require_user(self.directory.as_ref(), draft.user_id).await?;
        }

        let mut inboxes = self.lock();
        let inbox = inboxes.entry(draft.user_id).or_default();
        let id = inbox.next_id;
        inbox.next_id += 1;
        inbox.items.insert(
            id,
            Notification {
                id,
                user_id: draft.user_id,
                title: draft.title,
                category: draft.category,
                text: draft.text,
                is_read: false,
            },
        );

        debug!(user_id = draft.user_id, id, "Notification added");
        Ok(id)
    }

    pub fn remove(&self, user_id: UserId, id: NotificationId) -> GatewayResult<Notification> {
        self.lock()
            .get_mut(&user_id)
            .and_then(|inbox| inbox.items.remove(&id))
            .ok_or(GatewayError::NotificationNotFound { user_id, id })
    }

    /// Replaces title, category and text. Ids and the read flag are kept.
    pub fn edit(&self, notification: Notification) -> GatewayResult<()> {
        let mut inboxes = self.lock();
        let current = inboxes
            .get_mut(&notification.user_id)
            .and_then(|inbox| inbox.items.get_mut(&notification.id))
            .ok_or(GatewayError::NotificationNotFound {
                user_id: notification.user_id,
                id: notification.id,
            })?;

        current.title = notification.title;
        current.category = notification.category;
        current.text = notification.text;
        Ok(())
    }

    pub fn get(&self, user_id: UserId, id: NotificationId) -> GatewayResult<Notification> {
        self.lock()
            .get(&user_id)
            .and_then(|inbox| inbox.items.get(&id))
            .cloned()
            .ok_or(GatewayError::NotificationNotFound { user_id, id })
    }

    /// The whole inbox in id order.
    pub fn list(&self, user_id: UserId) -> Vec<Notification> {
        self.lock()
            .get(&user_id)
            .map(|inbox| inbox.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mark_read(&self, user_id: UserId, id: NotificationId) -> GatewayResult<()> {
        let mut inboxes = self.lock();
        let notification = inboxes
            .get_mut(&user_id)
            .and_then(|inbox| inbox.items.get_mut(&id))
            .ok_or(GatewayError::NotificationNotFound { user_id, id })?;

        if notification.is_read {
            return Err(GatewayError::AlreadyRead);
        }
        notification.is_read = true;
        Ok(())
    }

    /// Pushes the full inbox as one `all-notifications` frame. A user
    /// without a socket is not an error.
    pub async fn send_all(&self, user_id: UserId) -> GatewayResult<()> {
        let event = PushEvent::AllNotifications {
            all_notifications: self.list(user_id),
        };
        self.push(user_id, &event).await
    }

    pub async fn send_one(&self, user_id: UserId, id: NotificationId) -> GatewayResult<()> {
        let event = PushEvent::Notification {
            notification: self.get(user_id, id)?,
        };
        self.push(user_id, &event).await
    }

    async fn push(&self, user_id: UserId, event: &PushEvent) -> GatewayResult<()> {
        match self.registry.send_event(user_id, event).await {
            Err(GatewayError::NotConnected(_)) => {
                debug!(user_id, kind = event.kind(), "Push skipped, user offline");
                Ok(())
            }
            other => other,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Inbox>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
