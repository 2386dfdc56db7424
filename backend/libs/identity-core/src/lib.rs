//! Viewer identity for the Linkup client core.
//!
//! The authentication service itself is external. Everything downstream only
//! needs to know *who is looking* (or that nobody is), so this crate exposes:
//!
//! - [`UserId`]: opaque, lexically ordered user identifier
//! - [`Viewer`]: the signed-in user's basic profile fields
//! - [`IdentityProvider`]: the collaborator seam, queried synchronously
//! - [`SessionIdentity`]: an in-process provider updated on sign-in/sign-out
//!
//! # Example
//!
//! ```
//! use identity_core::{IdentityProvider, SessionIdentity, UserId, Viewer};
//!
//! let identity = SessionIdentity::default();
//! assert!(identity.require_viewer().is_err());
//!
//! identity.sign_in(Viewer::new(UserId::new("u1").unwrap(), "Ada"));
//! assert_eq!(identity.require_viewer().unwrap().id.as_str(), "u1");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};

/// Identity errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No viewer is signed in
    #[error("You must be logged in")]
    Unauthenticated,

    /// User ids must be non-empty and contain no separator characters
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
}

/// Opaque user identifier.
///
/// Ordering is plain lexical string ordering; canonical pair ids rely on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Separator used when two ids are joined into a pair id
    pub const PAIR_SEPARATOR: char = '_';

    pub fn new(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains(Self::PAIR_SEPARATOR) {
            return Err(IdentityError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for UserId {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

impl Viewer {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: String::new(),
            profile_picture: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_profile_picture(mut self, url: impl Into<String>) -> Self {
        self.profile_picture = Some(url.into());
        self
    }
}

/// Source of the current viewer identity.
///
/// Implementations must answer without I/O; mutating operations call this
/// before touching storage and fail fast when it returns `None`.
pub trait IdentityProvider: Send + Sync {
    fn current_viewer(&self) -> Option<Viewer>;

    /// Current viewer, or [`IdentityError::Unauthenticated`]
    fn require_viewer(&self) -> Result<Viewer, IdentityError> {
        self.current_viewer().ok_or(IdentityError::Unauthenticated)
    }

    fn current_viewer_id(&self) -> Option<UserId> {
        self.current_viewer().map(|viewer| viewer.id)
    }
}

/// In-process identity, updated by whatever drives the external auth flow
#[derive(Debug, Default)]
pub struct SessionIdentity {
    viewer: RwLock<Option<Viewer>>,
}

impl SessionIdentity {
    pub fn signed_in(viewer: Viewer) -> Self {
        Self {
            viewer: RwLock::new(Some(viewer)),
        }
    }

    pub fn sign_in(&self, viewer: Viewer) {
        info!(user_id = %viewer.id, "Viewer signed in");
        // A poisoned lock only means a writer panicked mid-assignment of an Option
        let mut guard = self.viewer.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(viewer);
    }

    pub fn sign_out(&self) {
        let mut guard = self.viewer.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = guard.take() {
            debug!(user_id = %previous.id, "Viewer signed out");
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_viewer(&self) -> Option<Viewer> {
        self.viewer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
