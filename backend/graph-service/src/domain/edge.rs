use chrono::{DateTime, Utc};
use document_store::Document;
use identity_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::RelationState;

/// Canonical id for the unordered pair `{a, b}`: both ids sorted lexically
/// and joined with `_`, so `edge_id(a, b) == edge_id(b, a)`.
pub fn edge_id(a: &UserId, b: &UserId) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", first, UserId::PAIR_SEPARATOR, second)
}

/// Stored status of a connection edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Pending,
    Connected,
}

impl EdgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Pending => "pending",
            EdgeStatus::Connected => "connected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EdgeStatus::Pending),
            "connected" => Some(EdgeStatus::Connected),
            _ => None,
        }
    }
}

/// Relationship edge between two distinct users (undirected once connected)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEdge {
    pub id: String,
    /// Participants, requester first as written
    pub users: [UserId; 2],
    pub requester_id: UserId,
    pub status: EdgeStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Why a stored connection document could not be mapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeParseError {
    pub id: String,
    pub reason: String,
}

impl std::fmt::Display for EdgeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection {}: {}", self.id, self.reason)
    }
}

impl std::error::Error for EdgeParseError {}

impl ConnectionEdge {
    pub fn new_pending(requester: UserId, target: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id: edge_id(&requester, &target),
            users: [requester.clone(), target],
            requester_id: requester,
            status: EdgeStatus::Pending,
            created_at: Some(at),
            updated_at: Some(at),
        }
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// The participant that is not `user`
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        match &self.users {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }

    pub fn state(&self) -> RelationState {
        match self.status {
            EdgeStatus::Pending => RelationState::PendingBy(self.requester_id.clone()),
            EdgeStatus::Connected => RelationState::Connected,
        }
    }

    /// Map a `connections` document, validating its shape once.
    ///
    /// `requesterId` may be missing on a connected edge; the first listed
    /// user is assumed then.
    pub fn from_document(doc: &Document) -> Result<Self, EdgeParseError> {
        let fail = |reason: &str| EdgeParseError {
            id: doc.id.clone(),
            reason: reason.to_string(),
        };

        let users: Vec<UserId> = doc
            .get("users")
            .and_then(Value::as_array)
            .ok_or_else(|| fail("missing users"))?
            .iter()
            .map(|v| v.as_str().and_then(|s| UserId::new(s).ok()))
            .collect::<Option<Vec<UserId>>>()
            .ok_or_else(|| fail("users must be valid ids"))?;

        let [a, b]: [UserId; 2] = users
            .try_into()
            .map_err(|_| fail("users must name exactly two participants"))?;
        if a == b {
            return Err(fail("users must be distinct"));
        }
        if doc.id != edge_id(&a, &b) {
            return Err(fail("id is not the canonical pair id"));
        }

        let status = doc
            .get_str("status")
            .and_then(EdgeStatus::parse)
            .ok_or_else(|| fail("unknown status"))?;

        let requester_id = match doc.get_str("requesterId").map(UserId::new) {
            Some(Ok(id)) if id == a || id == b => id,
            Some(_) => return Err(fail("requesterId is not a participant")),
            None if status == EdgeStatus::Connected => a.clone(),
            None => return Err(fail("pending edge without requesterId")),
        };

        Ok(Self {
            id: doc.id.clone(),
            users: [a, b],
            requester_id,
            status,
            created_at: parse_timestamp(doc.get("createdAt")),
            updated_at: parse_timestamp(doc.get("updatedAt")),
        })
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
