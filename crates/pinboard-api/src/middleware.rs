use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use pinboard_types::models::UserId;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_id";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// The `session_id` value from the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Resolves the session cookie to a user and, when CSRF protection is on,
/// checks the `X-CSRF-Token` header on anything that is not a read.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let session = state
        .sessions
        .lookup_by_token(token)
        .map_err(|_| ApiError::Unauthorized)?;

    let safe = matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if state.config.csrf && !safe {
        let presented = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Err(e) = state.registry.verify_csrf(session.user_id, presented) {
            debug!(user_id = session.user_id, method = %req.method(), "Rejected request: {}", e);
            return Err(e.into());
        }
    }

    req.extensions_mut().insert(AuthUser {
        user_id: session.user_id,
    });
    Ok(next.run(req).await)
}
