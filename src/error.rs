use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolSyncError {
    #[error("Spoolman is not enabled or has no URL configured")]
    NotConfigured,

    #[error("Printer {0} is not connected")]
    PrinterNotConnected(i64),

    #[error("Spoolman request failed: {0}")]
    Http(String),

    #[error("Spoolman returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode Spoolman response: {0}")]
    Decode(String),

    #[error("Tracking database error: {0}")]
    Database(String),

    #[error("3MF error: {0}")]
    ThreeMf(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl SpoolSyncError {
    /// Whether the failure happened before any response arrived, meaning a
    /// retry against a fresh client may succeed.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SpoolSyncError::Http(_))
    }
}

impl From<rusqlite::Error> for SpoolSyncError {
    fn from(err: rusqlite::Error) -> Self {
        SpoolSyncError::Database(err.to_string())
    }
}

impl From<SpoolSyncError> for String {
    fn from(err: SpoolSyncError) -> Self {
        err.to_string()
    }
}

pub type Result<T> = std::result::Result<T, SpoolSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_retry() {
        assert!(SpoolSyncError::Http("connection refused".into()).is_connection_error());
        assert!(!SpoolSyncError::Status {
            status: 500,
            body: String::new()
        }
        .is_connection_error());
        assert!(!SpoolSyncError::NotConfigured.is_connection_error());
    }

    #[test]
    fn test_into_string() {
        let message: String = SpoolSyncError::PrinterNotConnected(3).into();
        assert_eq!(message, "Printer 3 is not connected");
    }

    #[test]
    fn test_from_rusqlite() {
        let err: SpoolSyncError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SpoolSyncError::Database(_)));
    }
}
