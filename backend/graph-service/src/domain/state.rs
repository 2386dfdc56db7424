//! Relationship state machine for one unordered pair of users
//!
//! ```text
//! None          --A requests-->            PendingBy(A)
//! PendingBy(A)  --B accepts-->             Connected
//! any           --decline/cancel/remove--> None   (delete-if-exists)
//! ```
//!
//! Only requests and accepts can be rejected. The three deletes are valid
//! from every state and by either participant.

use identity_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pair state. `None` means no edge is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationState {
    None,
    PendingBy(UserId),
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationAction {
    Request,
    Accept,
    Decline,
    Cancel,
    Remove,
}

/// Relationship as seen by one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    NotConnected,
    PendingSent,
    PendingReceived,
    Connected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {action} while relationship is {from}")]
pub struct TransitionError {
    pub from: RelationState,
    pub action: RelationAction,
}

impl RelationState {
    /// Next state after `actor` performs `action`.
    ///
    /// `actor` is assumed to be one of the pair's participants.
    pub fn apply(
        &self,
        actor: &UserId,
        action: RelationAction,
    ) -> Result<RelationState, TransitionError> {
        use RelationAction::*;

        let next = match (self, action) {
            (RelationState::None, Request) => Some(RelationState::PendingBy(actor.clone())),
            (_, Decline | Cancel | Remove) => Some(RelationState::None),
            (RelationState::PendingBy(requester), Accept) if requester != actor => {
                Some(RelationState::Connected)
            }
            _ => None,
        };

        next.ok_or_else(|| TransitionError {
            from: self.clone(),
            action,
        })
    }

    pub fn status_for(&self, viewer: &UserId) -> ConnectionStatus {
        match self {
            RelationState::None => ConnectionStatus::NotConnected,
            RelationState::PendingBy(requester) if requester == viewer => {
                ConnectionStatus::PendingSent
            }
            RelationState::PendingBy(_) => ConnectionStatus::PendingReceived,
            RelationState::Connected => ConnectionStatus::Connected,
        }
    }
}

impl fmt::Display for RelationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationState::None => write!(f, "none"),
            RelationState::PendingBy(requester) => write!(f, "pending (requested by {})", requester),
            RelationState::Connected => write!(f, "connected"),
        }
    }
}

impl fmt::Display for RelationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationAction::Request => "request",
            RelationAction::Accept => "accept",
            RelationAction::Decline => "decline",
            RelationAction::Cancel => "cancel",
            RelationAction::Remove => "remove",
        };
        f.write_str(s)
    }
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::NotConnected => "not_connected",
            ConnectionStatus::PendingSent => "pending_sent",
            ConnectionStatus::PendingReceived => "pending_received",
            ConnectionStatus::Connected => "connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn test_full_table() {
        let (a, b) = (uid("a"), uid("b"));
        let pending_a = RelationState::PendingBy(a.clone());

        assert_eq!(
            RelationState::None.apply(&a, RelationAction::Request),
            Ok(pending_a.clone())
        );
        assert_eq!(
            RelationState::None.apply(&b, RelationAction::Request),
            Ok(RelationState::PendingBy(b.clone()))
        );
        assert_eq!(
            pending_a.apply(&b, RelationAction::Accept),
            Ok(RelationState::Connected)
        );
        assert_eq!(
            pending_a.apply(&b, RelationAction::Decline),
            Ok(RelationState::None)
        );
        assert_eq!(
            pending_a.apply(&a, RelationAction::Cancel),
            Ok(RelationState::None)
        );
        assert_eq!(
            RelationState::Connected.apply(&a, RelationAction::Remove),
            Ok(RelationState::None)
        );
        assert_eq!(
            RelationState::Connected.apply(&b, RelationAction::Remove),
            Ok(RelationState::None)
        );
    }

    #[test]
    fn test_requester_cannot_accept_own_request() {
        let a = uid("a");
        let err = RelationState::PendingBy(a.clone())
            .apply(&a, RelationAction::Accept)
            .unwrap_err();

        assert_eq!(err.action, RelationAction::Accept);
        assert_eq!(err.from, RelationState::PendingBy(a));
    }

    #[test]
    fn test_request_over_existing_edge_rejected() {
        let (a, b) = (uid("a"), uid("b"));
        assert!(RelationState::Connected
            .apply(&a, RelationAction::Request)
            .is_err());
        assert!(RelationState::PendingBy(b)
            .apply(&a, RelationAction::Request)
            .is_err());
    }

    #[test]
    fn test_deletes_valid_from_every_state() {
        let (a, b) = (uid("a"), uid("b"));
        let states = [
            RelationState::None,
            RelationState::PendingBy(a.clone()),
            RelationState::PendingBy(b.clone()),
            RelationState::Connected,
        ];

        for state in &states {
            for actor in [&a, &b] {
                for action in [RelationAction::Decline, RelationAction::Cancel, RelationAction::Remove] {
                    assert_eq!(
                        state.apply(actor, action),
                        Ok(RelationState::None),
                        "{action} by {actor} from {state}"
                    );
                }
            }
        }
        assert!(RelationState::None.apply(&a, RelationAction::Accept).is_err());
    }

    #[test]
    fn test_status_for_each_side() {
        let (a, b, c) = (uid("a"), uid("b"), uid("c"));
        let pending = RelationState::PendingBy(a.clone());

        assert_eq!(pending.status_for(&a), ConnectionStatus::PendingSent);
        assert_eq!(pending.status_for(&b), ConnectionStatus::PendingReceived);
        assert_eq!(RelationState::None.status_for(&c), ConnectionStatus::NotConnected);
        assert_eq!(RelationState::Connected.status_for(&b), ConnectionStatus::Connected);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::PendingReceived).unwrap(),
            "\"pending_received\""
        );
        assert_eq!(ConnectionStatus::NotConnected.as_str(), "not_connected");
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError {
            from: RelationState::Connected,
            action: RelationAction::Accept,
        };
        assert_eq!(err.to_string(), "cannot accept while relationship is connected");
    }
}
