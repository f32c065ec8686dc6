use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use tracing::{info, warn};

use pinboard_db::models::{CreateUserOutcome, NewUser};
use pinboard_gateway::session::{Session, random_token};
use pinboard_types::api::{LoginRequest, SignupRequest, SignupResponse};
use pinboard_types::models::UserId;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{CSRF_HEADER, SESSION_COOKIE, session_token};
use crate::state::{AppState, run_db};
use crate::validation;

const CSRF_TOKEN_BYTES: usize = 24;

/// Argon2id PHC string plus the salt it was made with.
pub fn hash_password(password: &str) -> anyhow::Result<(String, String)> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok((hash, salt.as_str().to_string()))
}

pub fn verify_password(password: &str, phc: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(phc).map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<Response> {
    validation::username(&req.username)?;
    validation::email(&req.email)?;
    validation::password(&req.password)?;
    validation::name("firstName", &req.first_name)?;
    validation::name("lastName", &req.last_name)?;

    let outcome = run_db(&state.db, move |db| {
        let (hash, salt) = hash_password(&req.password)?;
        db.create_user(&NewUser {
            username: &req.username,
            email: &req.email,
            password_hash: &hash,
            salt: &salt,
            first_name: &req.first_name,
            last_name: &req.last_name,
        })
    })
    .await?;

    let user_id = match outcome {
        CreateUserOutcome::Created(id) => id,
        CreateUserOutcome::UsernameTaken => {
            return Err(ApiError::Conflict("username already taken".into()));
        }
        CreateUserOutcome::EmailTaken => {
            return Err(ApiError::Conflict("email already registered".into()));
        }
    };
    info!(user_id, "User signed up");

    let headers = start_session(&state, user_id).await?;
    Ok((StatusCode::CREATED, headers, Json(SignupResponse { user_id })).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let username = req.username.clone();
    let user = run_db(&state.db, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let password_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&req.password, &password_hash))
        .await
        .map_err(anyhow::Error::from)??;
    if !valid {
        warn!(user_id = user.id, "Failed login");
        return Err(ApiError::Unauthorized);
    }

    let headers = start_session(&state, user.id).await?;
    info!(user_id = user.id, "User logged in");
    Ok((StatusCode::NO_CONTENT, headers).into_response())
}

/// Always clears the cookie, whatever else happens.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let clear = [(header::SET_COOKIE, cleared_cookie(state.config.tls))];

    let Some(session) = session_token(&headers).and_then(|t| state.sessions.retire(t)) else {
        return (StatusCode::UNAUTHORIZED, clear).into_response();
    };

    state.registry.close(session.user_id).await;
    info!(user_id = session.user_id, "User logged out");
    (StatusCode::NO_CONTENT, clear).into_response()
}

pub async fn check(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match session_token(&headers).map(|t| state.sessions.lookup_by_token(t)) {
        Some(Ok(_)) => StatusCode::NO_CONTENT,
        _ => StatusCode::UNAUTHORIZED,
    }
}

/// Issues the session and CSRF token. A session this one replaces has its
/// socket revoked.
async fn start_session(state: &AppState, user_id: UserId) -> ApiResult<HeaderMap> {
    let issued = state.sessions.issue(user_id)?;
    if issued.replaced.is_some() {
        info!(user_id, "Previous session replaced, revoking its socket");
        state.registry.revoke(user_id).await;
    }

    let csrf_token = random_token(CSRF_TOKEN_BYTES);
    state.registry.set_csrf_token(user_id, csrf_token.clone());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        header_value(session_cookie(&issued.session, state.config.tls))?,
    );
    headers.insert(HeaderName::from_static(CSRF_HEADER), header_value(csrf_token)?);
    Ok(headers)
}

fn header_value(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|e| ApiError::Internal(e.into()))
}

pub fn session_cookie(session: &Session, tls: bool) -> String {
    cookie(&session.token, session.expires_at, tls)
}

pub fn cleared_cookie(tls: bool) -> String {
    cookie("", DateTime::<Utc>::UNIX_EPOCH, tls)
}

fn cookie(value: &str, expires: DateTime<Utc>, tls: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; Expires={}",
        SESSION_COOKIE,
        value,
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if tls {
        cookie.push_str("; SameSite=None; Secure");
    }
    cookie
}
