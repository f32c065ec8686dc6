use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};

use pinboard_gateway::connection;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, session_token};
use crate::state::AppState;

/// GET /socket
pub async fn upgrade(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    // The socket is tied to the session that opened it.
    let token = session_token(&headers)
        .ok_or(ApiError::Unauthorized)?
        .to_string();
    let sessions = state.sessions.clone();
    let registry = state.registry.clone();
    let fanout = state.fanout.clone();
    let csrf = state.config.csrf;
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            auth.user_id,
            token,
            sessions,
            registry,
            fanout,
            csrf,
        )
    }))
}
