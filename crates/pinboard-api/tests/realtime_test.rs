//! End-to-end push scenarios: signup, follow fan-out, chats, and session
//! replacement, driven over real HTTP and websocket connections.

mod common;

use std::time::Duration;

use serde_json::{Value, json};

use common::*;

#[tokio::test]
async fn signup_then_socket_receives_empty_snapshot() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;

    assert_eq!(alice.user_id, 1);
    assert!(alice.session.len() >= 30);

    let mut socket = alice.open_socket_with(1, "").await;
    assert_eq!(
        next_text(&mut socket).await,
        r#"{"type":"all-notifications","allNotifications":[]}"#
    );
    assert_eq!(next_text(&mut socket).await, r#"{"type":"all-chats","allChats":[]}"#);
}

#[tokio::test]
async fn follow_pushes_notification_to_followed_user() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;
    let (mut bob_socket, _, _) = bob.connect().await;

    let response = alice.post_empty("/follow/2").await;
    assert_eq!(response.status(), 204);

    assert_eq!(
        next_text(&mut bob_socket).await,
        r#"{"type":"notification","notification":{"ID":0,"title":"New follower!","category":"followers","text":"You have received a new follower: alice","isRead":false}}"#
    );
}

#[tokio::test]
async fn duplicate_follow_is_rejected_without_second_notification() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;

    assert_eq!(alice.post_empty("/follow/bob").await.status(), 204);
    assert_eq!(alice.post_empty("/follow/2").await.status(), 409);

    let (_socket, notifications, _) = bob.connect().await;
    assert_eq!(notifications.as_array().unwrap().len(), 1);

    let inbox: Value = bob.get("/notifications").await.json().await.unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn follow_edge_cases() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    server.signup("bob").await;

    assert_eq!(alice.post_empty("/follow/alice").await.status(), 409);
    assert_eq!(alice.post_empty("/follow/99").await.status(), 404);
    assert_eq!(alice.post_empty("/follow/nobody").await.status(), 404);
    assert_eq!(alice.delete("/follow/bob").await.status(), 409);

    assert_eq!(alice.post_empty("/follow/bob").await.status(), 204);
    assert_eq!(alice.delete("/follow/bob").await.status(), 204);
    assert_eq!(alice.delete("/follow/bob").await.status(), 409);
}

#[tokio::test]
async fn first_message_opens_chat_on_both_sockets() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;
    let (mut alice_socket, _, _) = alice.connect().await;
    let (mut bob_socket, _, _) = bob.connect().await;

    let response = alice.post("/message/2", json!({ "messageText": "hi" })).await;
    assert_eq!(response.status(), 201);
    let sent: Value = response.json().await.unwrap();

    let alice_frame = next_event(&mut alice_socket).await;
    let bob_frame = next_event(&mut bob_socket).await;
    assert_eq!(alice_frame["type"], "new-chat");
    assert_eq!(bob_frame["type"], "new-chat");
    assert_eq!(alice_frame["chat"]["chatId"], bob_frame["chat"]["chatId"]);
    assert_eq!(alice_frame["chat"]["chatId"], sent["chatId"]);

    assert_eq!(alice_frame["chat"]["isRead"], true);
    assert_eq!(bob_frame["chat"]["isRead"], false);
    assert_eq!(alice_frame["chat"]["target"]["username"], "bob");
    assert_eq!(bob_frame["chat"]["target"]["username"], "alice");
    assert_eq!(bob_frame["chat"]["messages"][0]["text"], "hi");
}

#[tokio::test]
async fn second_message_appends_and_read_is_once() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;
    let (mut alice_socket, _, _) = alice.connect().await;
    let (mut bob_socket, _, _) = bob.connect().await;

    assert_eq!(
        alice.post("/message/2", json!({ "messageText": "hi" })).await.status(),
        201
    );
    let chat_id = next_event(&mut bob_socket).await["chat"]["chatId"].clone();
    next_event(&mut alice_socket).await;

    assert_eq!(
        alice.post("/message/bob", json!({ "messageText": "there" })).await.status(),
        201
    );
    for socket in [&mut alice_socket, &mut bob_socket] {
        let frame = next_event(socket).await;
        assert_eq!(frame["type"], "new-message");
        assert_eq!(frame["message"]["chatId"], chat_id);
        assert_eq!(frame["message"]["text"], "there");
    }

    let read_path = format!("/chats/read/{}", chat_id);
    assert_eq!(bob.put(&read_path).await.status(), 204);
    assert_eq!(bob.put(&read_path).await.status(), 409);
    // The author's side was never unread.
    assert_eq!(alice.put(&read_path).await.status(), 409);
}

#[tokio::test]
async fn chat_errors() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    server.signup("bob").await;
    let carol = server.signup("carol").await;

    assert_eq!(
        alice.post("/message/bob", json!({ "messageText": "" })).await.status(),
        400
    );
    assert_eq!(
        alice.post("/message/bob", json!({ "messageText": "   " })).await.status(),
        400
    );
    assert_eq!(
        alice.post("/message/alice", json!({ "messageText": "me" })).await.status(),
        400
    );
    assert_eq!(
        alice.post("/message/zed", json!({ "messageText": "hello?" })).await.status(),
        404
    );

    let sent: Value = alice
        .post("/message/bob", json!({ "messageText": "hi" }))
        .await
        .json()
        .await
        .unwrap();
    let read_path = format!("/chats/read/{}", sent["chatId"]);
    assert_eq!(carol.put(&read_path).await.status(), 403);
    assert_eq!(carol.put("/chats/read/42").await.status(), 404);

    let chats: Value = carol.get("/chats").await.json().await.unwrap();
    assert!(chats.as_array().unwrap().is_empty());
    let chats: Value = alice.get("/chats").await.json().await.unwrap();
    assert_eq!(chats.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn notification_read_is_once() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;

    assert_eq!(alice.post_empty("/follow/bob").await.status(), 204);
    assert_eq!(bob.put("/notifications/read/0").await.status(), 204);
    assert_eq!(bob.put("/notifications/read/0").await.status(), 409);
    assert_eq!(bob.put("/notifications/read/7").await.status(), 404);

    let inbox: Value = bob.get("/notifications").await.json().await.unwrap();
    assert_eq!(inbox[0]["isRead"], true);
}

#[tokio::test]
async fn new_login_replaces_session_and_socket() {
    let server = start_server(without_csrf()).await;
    let first = server.signup("alice").await;
    let bob = server.signup("bob").await;
    let (mut old_socket, _, _) = first.connect().await;

    let second = server.login("alice", first.user_id).await;
    assert_ne!(second.session, first.session);

    // The old cookie no longer authenticates.
    assert_eq!(first.get("/auth/check").await.status(), 401);
    assert_eq!(first.get("/notifications").await.status(), 401);
    assert_eq!(second.get("/auth/check").await.status(), 204);

    assert!(closed_by_server(&mut old_socket).await);

    // A push to the revoked connection drops it instead of failing the request.
    assert_eq!(bob.post_empty("/follow/alice").await.status(), 204);
    let registry = server.state.registry.clone();
    assert!(eventually(|| !registry.is_connected(first.user_id)).await);

    // Nothing is lost: the next socket gets the notification in its snapshot.
    let (_socket, notifications, _) = second.connect().await;
    assert_eq!(notifications[0]["text"], "You have received a new follower: bob");
}

#[tokio::test]
async fn socket_upgraded_before_relogin_is_refused_at_handshake() {
    let server = start_server(without_csrf()).await;
    let first = server.signup("alice").await;
    let bob = server.signup("bob").await;

    // Upgrade on the first session, then hold the handshake back.
    let mut stale = first.upgrade_socket().await;
    let second = server.login("alice", first.user_id).await;
    assert_eq!(first.get("/auth/check").await.status(), 401);

    send_handshake(&mut stale, first.user_id, "").await;
    assert!(closed_by_server(&mut stale).await);
    assert!(!server.state.registry.is_connected(first.user_id));

    // Pushes go to the current session's socket only.
    let (mut current, _, _) = second.connect().await;
    assert_eq!(bob.post_empty("/follow/alice").await.status(), 204);
    assert_eq!(next_event(&mut current).await["type"], "notification");
}

#[tokio::test]
async fn handshake_for_another_user_is_refused() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    server.signup("bob").await;

    let mut socket = alice.open_socket_with(2, "").await;
    assert!(closed_by_server(&mut socket).await);
    assert!(!server.state.registry.is_connected(2));
    assert!(!server.state.registry.is_connected(1));
}

#[tokio::test]
async fn reconnect_replaces_previous_socket() {
    let server = start_server(without_csrf()).await;
    let alice = server.signup("alice").await;
    let bob = server.signup("bob").await;

    let (mut first, _, _) = bob.connect().await;
    let (mut second, _, _) = bob.connect().await;
    assert!(closed_by_server(&mut first).await);

    assert_eq!(alice.post_empty("/follow/bob").await.status(), 204);
    assert_eq!(next_event(&mut second).await["type"], "notification");
    assert_quiet(&mut second, Duration::from_millis(200)).await;
}
