//! In-memory stand-ins for the user service and the websocket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pinboard_types::events::PushEvent;
use pinboard_types::models::{UserId, UserProfile};

use crate::directory::UserDirectory;
use crate::error::{GatewayError, GatewayResult};
use crate::sink::FrameSink;

#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<UserId, UserProfile>>,
    yielding: AtomicBool,
}

impl MemoryDirectory {
    pub fn with_users(names: &[(UserId, &str)]) -> Arc<Self> {
        let directory = Self::default();
        for (id, name) in names {
            directory.add(*id, name);
        }
        Arc::new(directory)
    }

    /// Every lookup yields to the scheduler once, so concurrent callers
    /// interleave at each directory call.
    pub fn yield_on_lookup(&self) {
        self.yielding.store(true, Ordering::SeqCst);
    }

    pub fn add(&self, user_id: UserId, username: &str) {
        self.users.lock().unwrap().insert(
            user_id,
            UserProfile {
                user_id,
                username: username.to_string(),
                avatar_path: String::new(),
            },
        );
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn profile(&self, user_id: UserId) -> GatewayResult<Option<UserProfile>> {
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }
}

/// Shared view of what a [`RecordingSink`] received.
#[derive(Clone, Default)]
pub struct Wire {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl Wire {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<PushEvent> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(PushEvent::kind).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every following write fails as if the peer vanished.
    pub fn break_transport(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

pub struct RecordingSink {
    wire: Wire,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> (Box<dyn FrameSink>, Wire) {
        let wire = Wire::default();
        let sink = Self {
            wire: wire.clone(),
            delay: None,
        };
        (Box::new(sink), wire)
    }

    /// Each write sleeps for `delay` before landing.
    pub fn slow(delay: Duration) -> (Box<dyn FrameSink>, Wire) {
        let wire = Wire::default();
        let sink = Self {
            wire: wire.clone(),
            delay: Some(delay),
        };
        (Box::new(sink), wire)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: String) -> GatewayResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.wire.is_closed() || self.wire.broken.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection closed".into()));
        }
        self.wire.frames.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.wire.closed.store(true, Ordering::SeqCst);
    }
}
