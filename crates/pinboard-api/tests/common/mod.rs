//! Shared harness: the real router on a random port over an in-memory
//! database, plus a cookie-carrying HTTP agent and a websocket client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pinboard_api::{AppState, AppStateInner, EdgeConfig};
use pinboard_db::Database;

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const PASSWORD: &str = "hunter2hunter2";

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
}

pub fn without_csrf() -> EdgeConfig {
    EdgeConfig {
        csrf: false,
        ..EdgeConfig::default()
    }
}

pub async fn start_server(config: EdgeConfig) -> TestServer {
    let db = Database::open_in_memory().expect("in-memory database");
    let state = AppStateInner::new(db, config);
    let app = pinboard_api::router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
    }
}

/// One logged-in browser: its session cookie and CSRF token.
pub struct Agent {
    pub client: reqwest::Client,
    pub base_url: String,
    pub addr: SocketAddr,
    pub user_id: i64,
    pub session: String,
    pub csrf: String,
}

fn cookie_value(response: &reqwest::Response) -> String {
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .expect("set-cookie header")
        .to_str()
        .unwrap();
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("session_id="))
        .expect("session_id cookie")
        .to_string()
}

fn csrf_value(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-csrf-token")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

impl TestServer {
    pub async fn signup_raw(&self, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/auth/signup", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn login_raw(&self, username: &str, password: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn signup(&self, username: &str) -> Agent {
        let response = self
            .signup_raw(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD,
            }))
            .await;
        assert_eq!(response.status(), 201, "signup {}", username);

        let session = cookie_value(&response);
        let csrf = csrf_value(&response);
        let body: Value = response.json().await.unwrap();
        Agent {
            client: reqwest::Client::new(),
            base_url: self.base_url.clone(),
            addr: self.addr,
            user_id: body["userId"].as_i64().unwrap(),
            session,
            csrf,
        }
    }

    pub async fn login(&self, username: &str, user_id: i64) -> Agent {
        let response = self.login_raw(username, PASSWORD).await;
        assert_eq!(response.status(), 204, "login {}", username);
        Agent {
            client: reqwest::Client::new(),
            base_url: self.base_url.clone(),
            addr: self.addr,
            user_id,
            session: cookie_value(&response),
            csrf: csrf_value(&response),
        }
    }
}

impl Agent {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("cookie", format!("session_id={}", self.session))
            .header("x-csrf-token", &self.csrf)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, path).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::POST, path).send().await.unwrap()
    }

    pub async fn put(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::PUT, path).send().await.unwrap()
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::DELETE, path).send().await.unwrap()
    }

    /// Upgrades `/socket` with this agent's cookie; no handshake yet.
    pub async fn upgrade_socket(&self) -> Socket {
        let mut request = format!("ws://{}/socket", self.addr)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            "cookie",
            HeaderValue::from_str(&format!("session_id={}", self.session)).unwrap(),
        );
        let (socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        socket
    }

    /// Upgrades `/socket` and sends the handshake frame, without waiting
    /// for anything back.
    pub async fn open_socket_with(&self, user_id: i64, csrf: &str) -> Socket {
        let mut socket = self.upgrade_socket().await;
        send_handshake(&mut socket, user_id, csrf).await;
        socket
    }

    /// Opens the socket and consumes the initial snapshot, returning the
    /// `allNotifications` and `allChats` payloads.
    pub async fn connect(&self) -> (Socket, Value, Value) {
        let mut socket = self.open_socket_with(self.user_id, &self.csrf).await;
        let notifications = next_event(&mut socket).await;
        assert_eq!(notifications["type"], "all-notifications");
        let chats = next_event(&mut socket).await;
        assert_eq!(chats["type"], "all-chats");
        (
            socket,
            notifications["allNotifications"].clone(),
            chats["allChats"].clone(),
        )
    }
}

pub async fn send_handshake(socket: &mut Socket, user_id: i64, csrf: &str) {
    let handshake = json!({ "userId": user_id, "csrfToken": csrf });
    socket
        .send(Message::Text(handshake.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame, skipping control frames. Panics after five seconds.
pub async fn next_text(socket: &mut Socket) -> String {
    let wait = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a text frame, got {:?}", other),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for a frame")
}

pub async fn next_event(socket: &mut Socket) -> Value {
    serde_json::from_str(&next_text(socket).await).unwrap()
}

/// True when the server ends the socket (close frame, EOF or reset) within
/// five seconds without sending any text first.
pub async fn closed_by_server(socket: &mut Socket) -> bool {
    let wait = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Text(_))) => return false,
                _ => return true,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or(false)
}

/// Asserts nothing but control frames arrive for `window`.
pub async fn assert_quiet(socket: &mut Socket, window: Duration) {
    let wait = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    };
    if let Ok(frame) = tokio::time::timeout(window, wait).await {
        panic!("expected silence, got {:?}", frame);
    }
}

/// Polls `check` every 20ms for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
