use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use pinboard_types::models::{Notification, NotificationId};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// PUT /notifications/read/{id}
pub async fn read_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<NotificationId>,
) -> ApiResult<StatusCode> {
    state.fanout.notifications().mark_read(auth.user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Json<Vec<Notification>> {
    Json(state.fanout.notifications().list(auth.user_id))
}
