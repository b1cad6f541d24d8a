use derive_more::Display;

/// Failure reported by a storage seam.
#[derive(Debug, Display)]
pub enum StoreError {
    /// Store unreachable: pool, network, TLS or protocol trouble.
    #[display(fmt = "store unavailable: {}", _0)]
    Unavailable(String),
    /// Unique-key violation.
    #[display(fmt = "duplicate key")]
    Duplicate,
    /// Any other statement-level failure.
    #[display(fmt = "query failed: {}", _0)]
    Query(String),
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Fatal errors abort the whole batch; the rest are per-record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000") => {
                StoreError::Duplicate
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_fatal() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_fatal());
        assert!(!StoreError::Duplicate.is_fatal());
    }

    #[test]
    fn display_mentions_cause() {
        let e = StoreError::Query("bad column".into());
        assert_eq!(e.to_string(), "query failed: bad column");
    }
}
