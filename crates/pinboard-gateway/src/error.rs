use pinboard_types::models::{ChatId, MessageId, NotificationId, UserId};

/// Coarse error classes; the HTTP edge maps each to exactly one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Transport,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("could not generate a unique session token")]
    TokenGenerationFailed,

    #[error("session not found")]
    SessionNotFound,

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("user {0} has no live connection")]
    NotConnected(UserId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("CSRF token mismatch")]
    CsrfMismatch,

    #[error("notification {id} not found for user {user_id}")]
    NotificationNotFound { user_id: UserId, id: NotificationId },

    #[error("already read")]
    AlreadyRead,

    #[error("chat {0} not found")]
    ChatNotFound(ChatId),

    #[error("message {message_id} not found in chat {chat_id}")]
    MessageNotFound { chat_id: ChatId, message_id: MessageId },

    #[error("chat {0} already exists for this pair")]
    ChatAlreadyExists(ChatId),

    #[error("user {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: ChatId, user_id: UserId },

    #[error("a chat needs two distinct users")]
    SelfChat,

    #[error("user directory error: {0}")]
    Directory(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SelfChat => ErrorKind::Validation,
            Self::SessionNotFound => ErrorKind::Unauthorized,
            Self::UserNotFound(_)
            | Self::NotConnected(_)
            | Self::NotificationNotFound { .. }
            | Self::ChatNotFound(_)
            | Self::MessageNotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyRead | Self::ChatAlreadyExists(_) => ErrorKind::Conflict,
            Self::CsrfMismatch | Self::NotParticipant { .. } => ErrorKind::Forbidden,
            Self::Transport(_) => ErrorKind::Transport,
            Self::TokenGenerationFailed | Self::Directory(_) | Self::Encode(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
