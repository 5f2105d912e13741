//! Error handling module for the sync engine.
//!
//! Provides a single error type shared by the stores, the remote transport and the
//! coordinator. The façade never lets these escape to the form layer.

/// Error codes as constants to avoid stringly-typed errors.
#[allow(dead_code)]
pub mod codes {
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const OFFLINE: &str = "OFFLINE";
}

/// Engine error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Local persistence failed (quota, locked database, I/O)
    Storage(String),
    /// The remote call did not complete (connection refused, reset, timeout)
    Network(String),
    /// The remote answered with a non-2xx status other than 404
    Http { status: u16, message: String },
    /// The remote answered 404
    NotFound(String),
    /// A payload could not be encoded or decoded
    Serialization(String),
    /// The device reports no connectivity
    Offline,
}

impl SyncError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Storage(_) => codes::STORAGE_ERROR,
            SyncError::Network(_) => codes::NETWORK_ERROR,
            SyncError::Http { .. } => codes::HTTP_ERROR,
            SyncError::NotFound(_) => codes::NOT_FOUND,
            SyncError::Serialization(_) => codes::SERIALIZATION_ERROR,
            SyncError::Offline => codes::OFFLINE,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            SyncError::Storage(msg) => msg.clone(),
            SyncError::Network(msg) => msg.clone(),
            SyncError::Http { status, message } => format!("HTTP {}: {}", status, message),
            SyncError::NotFound(msg) => msg.clone(),
            SyncError::Serialization(msg) => msg.clone(),
            SyncError::Offline => "device is offline".to_string(),
        }
    }

    /// True for a remote 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    /// True when the failure came from the network boundary rather than local storage.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Http { .. } | SyncError::NotFound(_) | SyncError::Offline
        )
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for SyncError {}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Storage error: {:?}", err);
        SyncError::Storage(format!("Storage error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Network error: {:?}", err);
        match err.status() {
            Some(status) if status == reqwest::StatusCode::NOT_FOUND => {
                SyncError::NotFound(err.to_string())
            }
            Some(status) => SyncError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SyncError::Network(format!("Network error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        SyncError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_display() {
        let err = SyncError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.error_code(), codes::HTTP_ERROR);
        assert_eq!(err.to_string(), "HTTP_ERROR: HTTP 503: Service Unavailable");
        assert!(err.is_remote());

        let err = SyncError::Storage("disk full".to_string());
        assert!(!err.is_remote());
        assert!(!err.is_not_found());
        assert!(SyncError::NotFound("gone".to_string()).is_not_found());
    }
}
