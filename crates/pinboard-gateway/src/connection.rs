use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pinboard_types::events::Handshake;
use pinboard_types::models::UserId;

use crate::fanout::FanOut;
use crate::registry::{ConnectionRegistry, SharedSink};
use crate::session::SessionStore;
use crate::sink::WsSink;

/// Server pings every 15 seconds; two unanswered pings drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one push socket for an already authenticated user.
///
/// The client must open with `{"userId": .., "csrfToken": ..}`. The user id
/// has to match the session the upgrade was authorised with, and the token
/// the one issued at login when CSRF checks are on. The session itself must
/// still be live when the socket is registered; a login in the meantime
/// replaces it and the socket is refused. After that the socket receives
/// the full snapshot and stays open until the peer leaves, the heartbeat
/// gives up, or a newer connection replaces it.
pub async fn handle_connection(
    socket: WebSocket,
    user_id: UserId,
    session_token: String,
    sessions: Arc<SessionStore>,
    registry: Arc<ConnectionRegistry>,
    fanout: Arc<FanOut>,
    csrf_enabled: bool,
) {
    let (sender, mut receiver) = socket.split();

    let Some(handshake) = wait_for_handshake(&mut receiver).await else {
        warn!(user_id, "Socket closed before handshake");
        reject(sender).await;
        return;
    };

    if handshake.user_id != user_id {
        warn!(
            user_id,
            claimed = handshake.user_id,
            "Handshake user does not match session"
        );
        reject(sender).await;
        return;
    }

    if csrf_enabled {
        if let Err(e) = registry.verify_csrf(user_id, &handshake.csrf_token) {
            warn!(user_id, "Handshake rejected: {}", e);
            reject(sender).await;
            return;
        }
    }

    let session_is_current = || {
        sessions
            .lookup_by_token(&session_token)
            .is_ok_and(|session| session.user_id == user_id)
    };
    let sink = Box::new(WsSink::new(sender));
    let handle = match registry
        .bind_while(user_id, sink, handshake.csrf_token, session_is_current)
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            warn!(user_id, "Could not register socket: {}", e);
            return;
        }
    };
    info!(user_id, conn_id = %handle.conn_id, "Push socket connected");

    if let Err(e) = fanout.connected(user_id).await {
        warn!(user_id, "Initial snapshot failed: {}", e);
    }

    let cancel = CancellationToken::new();
    let pong_received = Arc::new(AtomicBool::new(true));
    let heartbeat = tokio::spawn(run_heartbeat(
        user_id,
        handle.sink.clone(),
        pong_received.clone(),
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Pong(_))) => pong_received.store(true, Ordering::Release),
                Some(Ok(Message::Text(text))) => {
                    debug!(user_id, len = text.len(), "Ignoring client frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(user_id, "Socket read failed: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    cancel.cancel();
    let _ = heartbeat.await;

    registry.release(user_id, handle.conn_id);
    let close = async {
        handle.sink.lock().await.close().await;
    };
    if tokio::time::timeout(PING_TIMEOUT, close).await.is_err() {
        warn!(user_id, "Timed out closing socket");
    }
    info!(user_id, conn_id = %handle.conn_id, "Push socket disconnected");
}

async fn wait_for_handshake(receiver: &mut SplitStream<WebSocket>) -> Option<Handshake> {
    let wait = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match parse_handshake(&text) {
                    Some(handshake) => return Some(handshake),
                    None => debug!("Skipping non-handshake frame"),
                },
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    };

    tokio::time::timeout(HANDSHAKE_TIMEOUT, wait).await.ok().flatten()
}

fn parse_handshake(text: &str) -> Option<Handshake> {
    serde_json::from_str(text).ok()
}

async fn reject(mut sender: SplitSink<WebSocket, Message>) {
    let _ = sender.send(Message::Close(None)).await;
    let _ = sender.close().await;
}

async fn run_heartbeat(
    user_id: UserId,
    sink: SharedSink,
    pong_received: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await;
    let mut missed: u8 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        if pong_received.swap(false, Ordering::Acquire) {
            missed = 0;
        } else {
            missed += 1;
            if missed >= MAX_MISSED_PONGS {
                warn!(user_id, missed, "Heartbeat timeout, dropping connection");
                cancel.cancel();
                return;
            }
        }

        let ping = async { sink.lock().await.send_ping().await };
        match tokio::time::timeout(PING_TIMEOUT, ping).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(user_id, "Ping failed: {}", e);
                cancel.cancel();
                return;
            }
            Err(_) => {
                warn!(user_id, "Ping timed out");
                cancel.cancel();
                return;
            }
        }
    }
}
