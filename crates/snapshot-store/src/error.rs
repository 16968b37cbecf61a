//! Error types for the snapshot-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the image store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation on a blob or directory failed.
    #[error("io error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The requested blob or record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same file name already exists.
    #[error("duplicate key: {file_name}")]
    DuplicateKey { file_name: String },

    /// A stored or user-supplied timestamp could not be interpreted.
    #[error("cannot parse `{value}`: {reason}")]
    Parse { value: String, reason: String },

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A background task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Build an [`StoreError::Io`] with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means the key simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected() {
        let err = StoreError::NotFound {
            entity: "blob",
            id: "image-1.jpg".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "blob not found: image-1.jpg");
    }

    #[test]
    fn io_error_carries_context() {
        let err = StoreError::io(
            "writing blob image-1.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("writing blob image-1.jpg"));
    }
}
