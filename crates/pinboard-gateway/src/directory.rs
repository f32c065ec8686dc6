use async_trait::async_trait;

use pinboard_types::models::{UserId, UserProfile};

use crate::error::{GatewayError, GatewayResult};

/// The core's view of the user service. Users live in the persistence layer;
/// the core only asks whether one exists and how to present them.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: UserId) -> GatewayResult<Option<UserProfile>>;

    async fn exists(&self, user_id: UserId) -> GatewayResult<bool> {
        Ok(self.profile(user_id).await?.is_some())
    }
}

pub(crate) async fn require_profile(
    directory: &dyn UserDirectory,
    user_id: UserId,
) -> GatewayResult<UserProfile> {
    directory
        .profile(user_id)
        .await?
        .ok_or(GatewayError::UserNotFound(user_id))
}

pub(crate) async fn require_user(directory: &dyn UserDirectory, user_id: UserId) -> GatewayResult<()> {
    if directory.exists(user_id).await? {
        Ok(())
    } else {
        Err(GatewayError::UserNotFound(user_id))
    }
}
