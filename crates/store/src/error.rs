//! Error types for the document store.

use http::StatusCode;

use crate::types::{ObjectType, PathError};

/// Errors raised by the tree, version and document layers.
///
/// The first group are caller errors that abort the enclosing transaction and
/// are never retried. The rest wrap infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Path or node does not resolve for this owner
    #[error("record not found: {0}")]
    NotFound(String),

    /// Node is not of a type the operation accepts
    #[error("illegal object type: expected {expected} but found {found}")]
    IllegalType {
        expected: &'static str,
        found: String,
    },

    /// A required insert affected zero rows
    #[error("insert failure: {0}")]
    InsertFailure(&'static str),

    /// A required update affected zero rows
    #[error("update failure: {0}")]
    UpdateFailure(&'static str),

    /// A required delete affected zero rows
    #[error("delete failure: {0}")]
    DeleteFailure(&'static str),

    /// An invariant the orchestrator holds was violated mid-transaction
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// Upload body does not match its declared metadata
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting.")]
    BucketNotFound(String),

    /// Encoding a statement payload failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A detached operation task panicked or was aborted
    #[error("operation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn illegal_type(expected: &'static str, found: ObjectType) -> Self {
        StoreError::IllegalType {
            expected,
            found: found.to_string(),
        }
    }

    /// Transport status for this error. Unmapped kinds fall through to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::IllegalType { .. }
            | StoreError::InsertFailure(_)
            | StoreError::UpdateFailure(_)
            | StoreError::DeleteFailure(_)
            | StoreError::InvalidUpload(_)
            | StoreError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The backing store rejected the write on a uniqueness constraint.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StoreError::NotFound("/a".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::illegal_type("FILE", ObjectType::Dir).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::InsertFailure("tree").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::DeleteFailure("link").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::IllegalState("copy").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            StoreError::InvalidConfig("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_serialization_errors_are_their_own_kind() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert!(err.to_string().starts_with("serialization error"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
