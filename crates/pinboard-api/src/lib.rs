//! HTTP edge: cookie sessions, CSRF, validation, and the handlers that feed
//! domain events into the real-time core.

pub mod auth;
pub mod error;
pub mod follow;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod pins;
pub mod socket;
pub mod state;
pub mod users;
pub mod validation;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

pub use state::{AppState, AppStateInner, EdgeConfig};

/// Every route, without CORS or tracing layers; the binary adds those.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/check", get(auth::check));

    let protected_routes = Router::new()
        .route(
            "/follow/{target}",
            post(follow::follow).delete(follow::unfollow),
        )
        .route("/message/{target}", post(messages::send_message))
        .route("/chats", get(messages::list_chats))
        .route("/chats/read/{id}", put(messages::read_chat))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/read/{id}",
            put(notifications::read_notification),
        )
        .route("/pins", post(pins::create_pin))
        .route("/pins/{id}/report", post(pins::report_pin))
        .route("/pins/{id}/comments", post(pins::add_comment))
        .route("/socket", get(socket::upgrade))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
