use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, error};

use pinboard_types::models::UserId;

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 10;

/// 32 random bytes encode to 43 URL-safe characters.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Regeneration attempts when a fresh token collides with a live one.
const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Produces candidate session tokens. Replaceable so tests can force collisions.
pub type TokenSource = Box<dyn Fn() -> String + Send + Sync>;

/// Random bytes from the thread-local CSPRNG, URL-safe base64 without padding.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(&mut buf[..]);
    URL_SAFE_NO_PAD.encode(buf)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of [`SessionStore::issue`].
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    /// The session this one displaced, if the user was already logged in.
    pub replaced: Option<Session>,
}

/// Both maps always hold the same records: `by_user[s.user_id]` and
/// `by_token[s.token]` point at the same `Arc<Session>`.
#[derive(Default)]
struct SessionIndex {
    by_token: HashMap<String, Arc<Session>>,
    by_user: HashMap<UserId, Arc<Session>>,
}

impl SessionIndex {
    fn insert(&mut self, session: Arc<Session>) {
        self.by_token.insert(session.token.clone(), session.clone());
        self.by_user.insert(session.user_id, session);
    }

    fn remove_token(&mut self, token: &str) -> Option<Arc<Session>> {
        let session = self.by_token.remove(token)?;
        self.by_user.remove(&session.user_id);
        Some(session)
    }

    fn remove_user(&mut self, user_id: UserId) -> Option<Arc<Session>> {
        let session = self.by_user.remove(&user_id)?;
        self.by_token.remove(&session.token);
        Some(session)
    }
}

/// Session tokens <-> users, at most one live session per user.
///
/// A single lock covers both indexes; every mutation (including the removal
/// of an expired record found during lookup) happens under it.
pub struct SessionStore {
    ttl: Duration,
    tokens: TokenSource,
    index: Mutex<SessionIndex>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_token_source(ttl, Box::new(|| random_token(SESSION_TOKEN_BYTES)))
    }

    pub fn with_token_source(ttl: Duration, tokens: TokenSource) -> Self {
        Self {
            ttl,
            tokens,
            index: Mutex::new(SessionIndex::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: UserId) -> GatewayResult<IssuedSession> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issues a fresh session for `user_id`, retiring any previous one.
    /// Either both happen or neither does.
    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> GatewayResult<IssuedSession> {
        let mut index = self.lock();

        let mut token = None;
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let candidate = (self.tokens)();
            if !index.by_token.contains_key(&candidate) {
                token = Some(candidate);
                break;
            }
            debug!(user_id, attempt, "Session token collision, regenerating");
        }
        let Some(token) = token else {
            error!(user_id, "Session token generation exhausted {} attempts", MAX_TOKEN_ATTEMPTS);
            return Err(GatewayError::TokenGenerationFailed);
        };

        let replaced = index.remove_user(user_id).map(|old| (*old).clone());
        if replaced.is_some() {
            debug!(user_id, "Replacing existing session");
        }

        let session = Session {
            token,
            user_id,
            expires_at: now + self.ttl,
        };
        index.insert(Arc::new(session.clone()));

        Ok(IssuedSession { session, replaced })
    }

    pub fn lookup_by_token(&self, token: &str) -> GatewayResult<Session> {
        self.lookup_by_token_at(token, Utc::now())
    }

    /// Returns the live session for `token`. An expired record is removed
    /// and reported as missing.
    pub fn lookup_by_token_at(&self, token: &str, now: DateTime<Utc>) -> GatewayResult<Session> {
        let mut index = self.lock();
        let session = index
            .by_token
            .get(token)
            .cloned()
            .ok_or(GatewayError::SessionNotFound)?;

        if session.is_expired_at(now) {
            index.remove_token(token);
            debug!(user_id = session.user_id, "Session expired");
            return Err(GatewayError::SessionNotFound);
        }

        Ok((*session).clone())
    }

    pub fn lookup_by_user(&self, user_id: UserId) -> GatewayResult<Session> {
        self.lookup_by_user_at(user_id, Utc::now())
    }

    pub fn lookup_by_user_at(&self, user_id: UserId, now: DateTime<Utc>) -> GatewayResult<Session> {
        let mut index = self.lock();
        let session = index
            .by_user
            .get(&user_id)
            .cloned()
            .ok_or(GatewayError::SessionNotFound)?;

        if session.is_expired_at(now) {
            index.remove_user(user_id);
            debug!(user_id, "Session expired");
            return Err(GatewayError::SessionNotFound);
        }

        Ok((*session).clone())
    }

    /// Idempotent.
    pub fn retire(&self, token: &str) -> Option<Session> {
        self.lock().remove_token(token).map(|s| (*s).clone())
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, SessionIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn assert_dual_index(&self) {
        let index = self.lock();
        assert_eq!(index.by_token.len(), index.by_user.len());
        for (token, session) in &index.by_token {
            let by_user = &index.by_user[&session.user_id];
            assert_eq!(&by_user.token, token);
            assert!(Arc::ptr_eq(by_user, session));
        }
    }
}
