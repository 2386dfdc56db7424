/// Error types for connection graph operations
use crate::domain::edge::EdgeParseError;
use crate::domain::state::TransitionError;
use document_store::StoreError;
use identity_core::IdentityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("You must be logged in to manage connections")]
    Unauthenticated,

    #[error("Invalid user id: {0}")]
    InvalidUser(String),

    #[error("Cannot connect with yourself")]
    SelfConnection,

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Invalid connection document: {0}")]
    InvalidEdge(#[from] EdgeParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<IdentityError> for GraphError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthenticated => GraphError::Unauthenticated,
            IdentityError::InvalidUserId(id) => GraphError::InvalidUser(id),
        }
    }
}

impl GraphError {
    /// Only storage failures are worth offering a retry for
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
