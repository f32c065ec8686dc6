use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use pinboard_types::api::{SendMessageRequest, SendMessageResponse};
use pinboard_types::models::{ChatId, ChatView};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::users::resolve_user;
use crate::validation;

/// POST /message/{id|username}
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<SendMessageResponse>)> {
    validation::non_empty("messageText", &req.message_text)?;
    let recipient = resolve_user(&state, &target).await?;

    let delivery = state
        .fanout
        .message(auth.user_id, recipient.id, &req.message_text)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            chat_id: delivery.chat_id,
            message_id: delivery.message_id,
        }),
    ))
}

/// PUT /chats/read/{id}
pub async fn read_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<StatusCode> {
    state.fanout.chats().read_chat(chat_id, auth.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chats
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ChatView>>> {
    Ok(Json(state.fanout.chats().views_for(auth.user_id).await?))
}
