use std::fmt;

/// Error kinds surfaced to clients as reply frames (WS) or status + JSON (HTTP).
#[derive(Debug, Clone)]
pub enum ChatError {
    /// Malformed input, missing field, too long.
    Validation(String),
    /// Rejected by the profanity filter.
    ContentPolicy(String),
    NotFound(String),
    Forbidden(String),
    /// Missing/invalid/revoked credentials.
    AuthRequired(String),
    /// Account disabled; carries the stored reason.
    Suspended(String),
    Deleted,
    /// Uniqueness violation surfaced to the caller.
    Conflict(String),
    Internal(String),
}

impl ChatError {
    /// HTTP-shaped status code used in both transports.
    pub fn code(&self) -> u16 {
        match self {
            ChatError::Validation(_) => 400,
            ChatError::ContentPolicy(_) => 422,
            ChatError::NotFound(_) => 404,
            ChatError::Forbidden(_) => 403,
            ChatError::AuthRequired(_) => 401,
            ChatError::Suspended(_) => 403,
            ChatError::Deleted => 403,
            ChatError::Conflict(_) => 409,
            ChatError::Internal(_) => 500,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ChatError::Validation(d)
            | ChatError::ContentPolicy(d)
            | ChatError::NotFound(d)
            | ChatError::Forbidden(d)
            | ChatError::AuthRequired(d)
            | ChatError::Conflict(d) => d.clone(),
            ChatError::Suspended(reason) => format!("Account suspended: {reason}"),
            ChatError::Deleted => "Account deleted".to_string(),
            ChatError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Reply payload for the WebSocket transport: `{code, detail}`.
    pub fn to_frame(&self) -> serde_json::Value {
        serde_json::json!({"code": self.code(), "detail": self.detail()})
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.detail())
    }
}

impl std::error::Error for ChatError {}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => ChatError::NotFound("Not found".to_string()),
            other => ChatError::Internal(other.to_string()),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
