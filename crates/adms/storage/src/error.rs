//! Storage errors.

/// Errors returned by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness rule or an optimistic check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Query failure.
    #[error("database error: {0}")]
    Database(diesel::result::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl StoreError {
    /// Whether this is a conflict the caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(error: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}
