//! Error taxonomy shared by every component.

/// Error type for all roster, cache and session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// Bad user input (password rules, malformed roster edit, bad shift code).
    #[error("validation error: {0}")]
    Validation(String),

    /// A read or write against the persistence / notification collaborator failed.
    #[error("remote I/O error: {0}")]
    RemoteIo(String),

    /// Bad credentials, or the session is missing or expired.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The operation is not allowed in the current state.
    #[error("state error: {0}")]
    State(String),
}

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn remote<S: Into<String>>(message: S) -> Self {
        Self::RemoteIo(message.into())
    }

    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth(message.into())
    }

    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State(message.into())
    }

    /// Only remote failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteIo(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::RemoteIo(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::RemoteIo(format!("migration failed: {e}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::RemoteIo(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}
