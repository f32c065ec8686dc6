use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pinboard_types::events::PushEvent;
use pinboard_types::models::UserId;

use crate::directory::{UserDirectory, require_user};
use crate::error::{GatewayError, GatewayResult};
use crate::sink::FrameSink;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write half guarded by the per-connection write mutex. Tokio's mutex is
/// FIFO, so writers are served in the order they started waiting.
pub type SharedSink = Arc<AsyncMutex<Box<dyn FrameSink>>>;

/// What [`ConnectionRegistry::bind`] hands back to the connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub sink: SharedSink,
}

struct LiveConnection {
    conn_id: Uuid,
    sink: SharedSink,
}

/// Per-user record. A slot may exist with only a CSRF token, reserved at
/// login before the socket arrives.
#[derive(Default)]
struct Slot {
    csrf_token: Option<String>,
    live: Option<LiveConnection>,
}

enum BindStep {
    Bound,
    Replace(LiveConnection),
    Stale,
}

/// user -> (live writer, CSRF token, write mutex). At most one live writer
/// per user; binding a new one closes the old.
///
/// The map lock is never held across an await; transport I/O only happens
/// under the per-connection mutex.
pub struct ConnectionRegistry {
    directory: Arc<dyn UserDirectory>,
    write_timeout: Duration,
    slots: Mutex<HashMap<UserId, Slot>>,
}

impl ConnectionRegistry {
    pub fn new(directory: Arc<dyn UserDirectory>, write_timeout: Duration) -> Self {
        Self {
            directory,
            write_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `sink` as the user's live transport. Any previous writer is
    /// closed before the new one is stored.
    pub async fn bind(
        &self,
        user_id: UserId,
        sink: Box<dyn FrameSink>,
        csrf_token: String,
    ) -> GatewayResult<ConnectionHandle> {
        self.bind_while(user_id, sink, csrf_token, || true).await
    }

    /// Like [`bind`](Self::bind), but `is_current` is checked under the map
    /// lock at the moment of insertion. When it returns false the sink is
    /// closed and `SessionNotFound` is returned.
    ///
    /// A session replaced after the check revokes through this same lock, so
    /// it always finds the connection stored here.
    pub async fn bind_while<F>(
        &self,
        user_id: UserId,
        sink: Box<dyn FrameSink>,
        csrf_token: String,
        is_current: F,
    ) -> GatewayResult<ConnectionHandle>
    where
        F: Fn() -> bool + Send,
    {
        require_user(self.directory.as_ref(), user_id).await?;

        let handle = ConnectionHandle {
            conn_id: Uuid::new_v4(),
            sink: Arc::new(AsyncMutex::new(sink)),
        };

        loop {
            let step = {
                let mut slots = self.lock();
                if !is_current() {
                    BindStep::Stale
                } else {
                    let slot = slots.entry(user_id).or_default();
                    match slot.live.take() {
                        Some(previous) => BindStep::Replace(previous),
                        None => {
                            slot.live = Some(LiveConnection {
                                conn_id: handle.conn_id,
                                sink: handle.sink.clone(),
                            });
                            slot.csrf_token = Some(csrf_token.clone());
                            BindStep::Bound
                        }
                    }
                }
            };

            match step {
                BindStep::Replace(previous) => {
                    info!(user_id, old_conn = %previous.conn_id, "Replacing live connection");
                    self.close_sink(&previous.sink).await;
                }
                BindStep::Bound => break,
                BindStep::Stale => {
                    debug!(user_id, "Session gone before bind, closing socket");
                    self.close_sink(&handle.sink).await;
                    return Err(GatewayError::SessionNotFound);
                }
            }
        }

        debug!(user_id, conn_id = %handle.conn_id, "Connection bound");
        Ok(handle)
    }

    /// Records the CSRF token issued at login, reserving a slot when the
    /// user has no socket yet.
    pub fn set_csrf_token(&self, user_id: UserId, token: String) {
        self.lock().entry(user_id).or_default().csrf_token = Some(token);
    }

    pub fn verify_csrf(&self, user_id: UserId, token: &str) -> GatewayResult<()> {
        let slots = self.lock();
        let expected = slots
            .get(&user_id)
            .and_then(|slot| slot.csrf_token.as_deref())
            .ok_or(GatewayError::CsrfMismatch)?;

        if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::CsrfMismatch)
        }
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.lock()
            .get(&user_id)
            .is_some_and(|slot| slot.live.is_some())
    }

    pub async fn send(&self, user_id: UserId, frame: String) -> GatewayResult<()> {
        self.send_many(user_id, vec![frame]).await
    }

    pub async fn send_event(&self, user_id: UserId, event: &PushEvent) -> GatewayResult<()> {
        let frame = serde_json::to_string(event)?;
        self.send(user_id, frame).await
    }

    /// Writes `frames` back to back under one hold of the write mutex.
    /// Stops at the first failure; frames already written stay written. A
    /// failed or timed-out write closes the connection and evicts it.
    pub async fn send_many(&self, user_id: UserId, frames: Vec<String>) -> GatewayResult<()> {
        let (conn_id, sink) = {
            let slots = self.lock();
            let live = slots
                .get(&user_id)
                .and_then(|slot| slot.live.as_ref())
                .ok_or(GatewayError::NotConnected(user_id))?;
            (live.conn_id, live.sink.clone())
        };

        let mut writer = sink.lock().await;
        for frame in frames {
            let result = match tokio::time::timeout(self.write_timeout, writer.send_text(frame)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Transport(format!(
                    "write timed out after {:?}",
                    self.write_timeout
                ))),
            };

            if let Err(e) = result {
                warn!(user_id, %conn_id, "Push failed, dropping connection: {}", e);
                writer.close().await;
                drop(writer);
                self.release(user_id, conn_id);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Closes and forgets the user's connection, CSRF token included.
    pub async fn close(&self, user_id: UserId) -> bool {
        let removed = self.lock().remove(&user_id);
        match removed.and_then(|slot| slot.live) {
            Some(live) => {
                debug!(user_id, conn_id = %live.conn_id, "Connection closed");
                self.close_sink(&live.sink).await;
                true
            }
            None => false,
        }
    }

    /// Closes the live writer but keeps the slot, so the next push reports a
    /// transport error and evicts it. Used when the user's session is replaced.
    pub async fn revoke(&self, user_id: UserId) {
        let sink = {
            let slots = self.lock();
            slots
                .get(&user_id)
                .and_then(|slot| slot.live.as_ref())
                .map(|live| live.sink.clone())
        };
        if let Some(sink) = sink {
            debug!(user_id, "Connection revoked");
            self.close_sink(&sink).await;
        }
    }

    /// Drops the live connection, but only if it is still `conn_id`. A newer
    /// connection is left alone.
    pub fn release(&self, user_id: UserId, conn_id: Uuid) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(&user_id) {
            if slot.live.as_ref().is_some_and(|live| live.conn_id == conn_id) {
                slot.live = None;
                debug!(user_id, %conn_id, "Connection released");
            }
        }
    }

    async fn close_sink(&self, sink: &SharedSink) {
        let close = async {
            sink.lock().await.close().await;
        };
        if tokio::time::timeout(self.write_timeout, close).await.is_err() {
            warn!("Timed out closing connection");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Length leaks, contents do not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
