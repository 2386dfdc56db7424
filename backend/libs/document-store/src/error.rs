//! Error types for document store operations

use crate::Collection;
use thiserror::Error;

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Document serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Update targeted a document that does not exist
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    /// Stored payload is not a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Live query listener stopped
    #[error("Subscription closed")]
    SubscriptionClosed,
}

impl StoreError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Whether a caller may reasonably retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Redis(_) | StoreError::SubscriptionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::not_found(Collection::Connections, "a_b");
        assert_eq!(err.to_string(), "Document not found: connections/a_b");

        let err = StoreError::InvalidDocument("not an object".to_string());
        assert_eq!(err.to_string(), "Invalid document: not an object");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert!(!err.is_retryable());
    }
}
