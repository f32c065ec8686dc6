use pinboard_db::models::UserRow;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_db};

/// Resolves a `{id|username}` path segment. All-digit segments are ids.
pub async fn resolve_user(state: &AppState, segment: &str) -> ApiResult<UserRow> {
    let row = match segment.parse::<i64>() {
        Ok(id) => run_db(&state.db, move |db| db.get_user_by_id(id)).await?,
        Err(_) => {
            let username = segment.to_string();
            run_db(&state.db, move |db| db.get_user_by_username(&username)).await?
        }
    };
    row.ok_or_else(|| ApiError::NotFound("user not found".into()))
}

/// The authenticated caller's own row. A valid session for a deleted user
/// is treated as no session.
pub async fn current_user(state: &AppState, user_id: i64) -> ApiResult<UserRow> {
    run_db(&state.db, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or(ApiError::Unauthorized)
}
