use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pinboard_db::Database;
use pinboard_gateway::chats::ChatStore;
use pinboard_gateway::directory::UserDirectory;
use pinboard_gateway::fanout::{DEFAULT_REPORT_THRESHOLD, FanOut};
use pinboard_gateway::notifications::NotificationStore;
use pinboard_gateway::registry::{ConnectionRegistry, DEFAULT_WRITE_TIMEOUT};
use pinboard_gateway::session::{DEFAULT_SESSION_TTL_HOURS, SessionStore};
use pinboard_gateway::{GatewayError, GatewayResult};
use pinboard_types::models::{UserId, UserProfile};

/// Knobs the HTTP edge needs. The binary fills these from the environment.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub session_ttl: chrono::Duration,
    pub tls: bool,
    pub csrf: bool,
    pub write_timeout: Duration,
    pub report_threshold: i64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            tls: false,
            csrf: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            report_threshold: DEFAULT_REPORT_THRESHOLD,
        }
    }
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub fanout: Arc<FanOut>,
    pub config: EdgeConfig,
}

impl AppStateInner {
    /// Wires the real-time core on top of `db`.
    pub fn new(db: Database, config: EdgeConfig) -> AppState {
        let db = Arc::new(db);
        let directory: Arc<dyn UserDirectory> = Arc::new(DbDirectory { db: db.clone() });

        let registry = Arc::new(ConnectionRegistry::new(
            directory.clone(),
            config.write_timeout,
        ));
        let notifications = Arc::new(NotificationStore::new(directory.clone(), registry.clone()));
        let chats = Arc::new(ChatStore::new(directory, registry.clone()));
        let fanout = Arc::new(FanOut::new(notifications, chats, config.report_threshold));

        Arc::new(Self {
            db,
            sessions: Arc::new(SessionStore::new(config.session_ttl)),
            registry,
            fanout,
            config,
        })
    }
}

/// Runs a blocking database call off the async workers.
pub async fn run_db<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

/// Answers the core's user questions from the users table.
pub struct DbDirectory {
    db: Arc<Database>,
}

#[async_trait]
impl UserDirectory for DbDirectory {
    async fn profile(&self, user_id: UserId) -> GatewayResult<Option<UserProfile>> {
        let row = run_db(&self.db, move |db| db.get_user_by_id(user_id))
            .await
            .map_err(|e| GatewayError::Directory(e.to_string()))?;
        Ok(row.map(|user| user.profile()))
    }
}
