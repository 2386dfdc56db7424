/// Error types for social-service
use document_store::StoreError;
use graph_service::GraphError;
use identity_core::IdentityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Connection error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthenticated => ServiceError::Unauthenticated,
            IdentityError::InvalidUserId(id) => {
                ServiceError::InvalidInput(format!("invalid user id {id:?}"))
            }
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Storage(StoreError::Serialization(err))
    }
}

impl ServiceError {
    /// Only storage failures are worth a "try again"
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Storage(e) => e.is_retryable(),
            ServiceError::Graph(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Short message for the UI boundary
    pub fn user_message(&self) -> String {
        if self.is_retryable() {
            "Something went wrong. Please try again.".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use document_store::Collection;

    #[test]
    fn test_identity_errors_map() {
        assert!(matches!(
            ServiceError::from(IdentityError::Unauthenticated),
            ServiceError::Unauthenticated
        ));
        assert!(matches!(
            ServiceError::from(IdentityError::InvalidUserId("a_b".into())),
            ServiceError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_retryable_only_for_transient_storage() {
        assert!(ServiceError::Storage(StoreError::SubscriptionClosed).is_retryable());
        assert!(!ServiceError::Storage(StoreError::not_found(Collection::Posts, "p1")).is_retryable());
        assert!(!ServiceError::Forbidden("post p1".into()).is_retryable());
        assert_eq!(
            ServiceError::Unauthenticated.user_message(),
            "Not signed in"
        );
    }
}
