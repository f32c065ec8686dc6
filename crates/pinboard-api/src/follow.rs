use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, warn};

use pinboard_db::models::{FollowOutcome, UnfollowOutcome};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::{AppState, run_db};
use crate::users::{current_user, resolve_user};

pub async fn follow(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target): Path<String>,
) -> ApiResult<StatusCode> {
    let followed = resolve_user(&state, &target).await?;
    if followed.id == auth.user_id {
        return Err(ApiError::Conflict("cannot follow yourself".into()));
    }
    let follower = current_user(&state, auth.user_id).await?;

    let followed_id = followed.id;
    let outcome = run_db(&state.db, move |db| db.follow(auth.user_id, followed_id)).await?;
    match outcome {
        FollowOutcome::Followed => {}
        FollowOutcome::AlreadyFollowing => {
            return Err(ApiError::Conflict("already following".into()));
        }
        FollowOutcome::UnknownUser => return Err(ApiError::NotFound("user not found".into())),
    }
    info!(follower = auth.user_id, followed = followed_id, "Follow");

    // The follow is committed; a failed notification does not undo it.
    if let Err(e) = state.fanout.new_follower(&follower.profile(), followed_id).await {
        warn!(followed = followed_id, "Follow notification failed: {}", e);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target): Path<String>,
) -> ApiResult<StatusCode> {
    let followed = resolve_user(&state, &target).await?;
    let follower = current_user(&state, auth.user_id).await?;

    let followed_id = followed.id;
    let outcome = run_db(&state.db, move |db| db.unfollow(auth.user_id, followed_id)).await?;
    match outcome {
        UnfollowOutcome::Unfollowed => {}
        UnfollowOutcome::NotFollowing => {
            return Err(ApiError::Conflict("not following".into()));
        }
        UnfollowOutcome::UnknownUser => return Err(ApiError::NotFound("user not found".into())),
    }
    info!(follower = auth.user_id, followed = followed_id, "Unfollow");

    if let Err(e) = state.fanout.unfollowed(&follower.profile(), followed_id).await {
        warn!(followed = followed_id, "Unfollow notification failed: {}", e);
    }
    Ok(StatusCode::NO_CONTENT)
}
