use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid grade: {0}. Must be 1 (Again), 2 (Hard), 3 (Good), or 4 (Easy)")]
    InvalidGrade(u32),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(i64),

    #[error("Card not found: {0}")]
    CardNotFound(i64),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),
}

/// The four error classes callers react to, plus ambient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidState,
    Persistence,
    NotFound,
    Other,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::InvalidGrade(_) => ErrorKind::Validation,
            AppError::InvalidState(_) => ErrorKind::InvalidState,
            AppError::Persistence(_) => ErrorKind::Persistence,
            AppError::CollectionNotFound(_)
            | AppError::CardNotFound(_)
            | AppError::SessionNotFound(_) => ErrorKind::NotFound,
            AppError::Json(_) | AppError::Io(_) | AppError::Config(_) => ErrorKind::Other,
        }
    }

    /// Only a failed write may be retried with the same inputs; nothing was applied.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_error_taxonomy() {
        assert_eq!(AppError::InvalidGrade(7).kind(), ErrorKind::Validation);
        assert_eq!(
            AppError::InvalidState("done".into()).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(AppError::SessionNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::Persistence(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn only_persistence_failures_are_retryable() {
        assert!(AppError::Persistence(rusqlite::Error::InvalidQuery).is_retryable());
        assert!(!AppError::CardNotFound(3).is_retryable());
        assert!(!AppError::Validation("quota".into()).is_retryable());
    }
}
