use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Database(anyhow::Error),
    DatabaseError(String),
    PageNotFound(String),
    VersionNotFound(String),
    SlugConflict { parent: Option<i64>, slug: String },
    CyclicParent { page_id: i64, new_parent_id: i64 },
    InvalidSchedule(String),
    AlreadyPublished { version_id: i64 },
    ConcurrentVersionConflict { page_id: i64 },
    Validation(String),
    SerializationError(String),
    DeserializationError(String),
    CacheError(String),
    ConfigurationError(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::PageNotFound(msg) => write!(f, "Page not found: {}", msg),
            AppError::VersionNotFound(msg) => write!(f, "Version not found: {}", msg),
            AppError::SlugConflict { parent, slug } => match parent {
                Some(parent) => {
                    write!(f, "Slug '{}' already used by a sibling under page {}", slug, parent)
                }
                None => write!(f, "Slug '{}' already used by another root page", slug),
            },
            AppError::CyclicParent { page_id, new_parent_id } => write!(
                f,
                "Reparenting page {} under {} would create a cycle",
                page_id, new_parent_id
            ),
            AppError::InvalidSchedule(msg) => write!(f, "Invalid schedule: {}", msg),
            AppError::AlreadyPublished { version_id } => {
                write!(f, "Version {} is already published", version_id)
            }
            AppError::ConcurrentVersionConflict { page_id } => write!(
                f,
                "Concurrent version write on page {}, retry the operation",
                page_id
            ),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::CacheError(msg) => write!(f, "Cache error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl AppError {
    /// Errors worth retrying at the caller (write/write races, not invariant violations).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentVersionConflict { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_races_are_retryable() {
        assert!(AppError::ConcurrentVersionConflict { page_id: 1 }.is_retryable());
        assert!(!AppError::Validation("bad widget".to_string()).is_retryable());
        assert!(!AppError::PageNotFound("page 1".to_string()).is_retryable());
        assert!(!AppError::AlreadyPublished { version_id: 1 }.is_retryable());
    }
}
