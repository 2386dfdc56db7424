//! Viewer-scoped connection graph
//!
//! Holds the viewer's edge snapshot (replaced wholesale by the live query)
//! and performs relationship transitions through the document store.
//! Successful writes are also applied to the local snapshot so the viewer
//! sees the result before the subscription catches up.

use crate::config::GraphConfig;
use crate::domain::edge::{edge_id, ConnectionEdge, EdgeStatus};
use crate::domain::state::{ConnectionStatus, RelationAction, RelationState};
use crate::error::{GraphError, GraphResult};
use chrono::Utc;
use document_store::{Collection, Document, DocumentStore, Filter, Patch, Query};
use identity_core::{IdentityProvider, UserId};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub struct ConnectionGraph {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    config: GraphConfig,
    edges: RwLock<BTreeMap<String, ConnectionEdge>>,
}

impl ConnectionGraph {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        config: GraphConfig,
    ) -> Self {
        Self {
            store,
            identity,
            config,
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Live query for every edge the viewer participates in
    pub fn watch_query(viewer: &UserId) -> Query {
        Query::collection(Collection::Connections)
            .filter(Filter::array_contains("users", viewer.as_str()))
    }

    // Snapshot guards: a poisoned lock still holds a consistent map because
    // every writer replaces or inserts whole entries.
    fn read_edges(&self) -> RwLockReadGuard<'_, BTreeMap<String, ConnectionEdge>> {
        self.edges.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_edges(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ConnectionEdge>> {
        self.edges.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the local snapshot with a pushed result set.
    ///
    /// Malformed documents are skipped. Returns the number of edges kept.
    pub fn apply_snapshot(&self, documents: &[Document]) -> usize {
        let mut next = BTreeMap::new();
        for doc in documents {
            match ConnectionEdge::from_document(doc) {
                Ok(edge) => {
                    next.insert(edge.id.clone(), edge);
                }
                Err(e) => warn!(error = %e, "Skipping malformed connection document"),
            }
        }

        let kept = next.len();
        *self.write_edges() = next;
        debug!(edges = kept, "Connection snapshot applied");
        kept
    }

    /// Re-read the viewer's edges from the store and apply them
    pub async fn refresh(&self) -> GraphResult<usize> {
        let viewer = self.identity.require_viewer()?;
        let docs = self.store.query(&Self::watch_query(&viewer.id)).await?;
        Ok(self.apply_snapshot(&docs))
    }

    fn state_between(&self, viewer: &UserId, target: &UserId) -> RelationState {
        self.read_edges()
            .get(&edge_id(viewer, target))
            .map(ConnectionEdge::state)
            .unwrap_or(RelationState::None)
    }

    /// Relationship between the viewer and `target`, from the local snapshot only
    pub fn status(&self, target: &UserId) -> ConnectionStatus {
        match self.identity.current_viewer_id() {
            Some(viewer) => self.state_between(&viewer, target).status_for(&viewer),
            None => ConnectionStatus::NotConnected,
        }
    }

    fn participant(&self, target: &UserId) -> GraphResult<UserId> {
        let viewer = self.identity.require_viewer()?.id;
        if viewer == *target {
            return Err(GraphError::SelfConnection);
        }
        Ok(viewer)
    }

    /// Viewer id plus a strict-mode check of `action` against the snapshot
    fn authorize(&self, target: &UserId, action: RelationAction) -> GraphResult<UserId> {
        let viewer = self.participant(target)?;

        if self.config.strict_transitions {
            let current = self.state_between(&viewer, target);
            if let Err(e) = current.apply(&viewer, action) {
                warn!(
                    user_id = %viewer,
                    target_id = %target,
                    action = %action,
                    state = %current,
                    "Rejected connection transition"
                );
                return Err(e.into());
            }
        }

        Ok(viewer)
    }

    /// Ask `target` to connect.
    ///
    /// Writes a fresh pending edge at the canonical pair id. In permissive
    /// mode any existing edge is overwritten.
    pub async fn send_request(&self, target: &UserId) -> GraphResult<ConnectionEdge> {
        let viewer = self.authorize(target, RelationAction::Request)?;
        let edge = ConnectionEdge::new_pending(viewer.clone(), target.clone(), Utc::now());

        debug!(edge_id = %edge.id, user_id = %viewer, target_id = %target, "Sending connection request");

        let patch = Patch::new()
            .set("users", json!([viewer.as_str(), target.as_str()]))
            .set("requesterId", viewer.as_str())
            .set("status", EdgeStatus::Pending.as_str())
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        self.store.set(Collection::Connections, &edge.id, patch).await?;

        self.write_edges().insert(edge.id.clone(), edge.clone());
        info!(edge_id = %edge.id, user_id = %viewer, target_id = %target, "Connection request sent");
        Ok(edge)
    }

    /// Accept the pending request from `requester`.
    ///
    /// In permissive mode the stored status is flipped without looking at
    /// it; a missing edge surfaces as a storage `NotFound`.
    pub async fn accept_request(&self, requester: &UserId) -> GraphResult<()> {
        let viewer = self.authorize(requester, RelationAction::Accept)?;
        let id = edge_id(&viewer, requester);

        debug!(edge_id = %id, user_id = %viewer, "Accepting connection request");

        let patch = Patch::new()
            .set("status", EdgeStatus::Connected.as_str())
            .server_timestamp("updatedAt");
        self.store.update(Collection::Connections, &id, patch).await?;

        if let Some(edge) = self.write_edges().get_mut(&id) {
            edge.status = EdgeStatus::Connected;
            edge.updated_at = Some(Utc::now());
        }
        info!(edge_id = %id, user_id = %viewer, requester_id = %requester, "Connection accepted");
        Ok(())
    }

    /// Decline a request received from `requester`. Like every delete, this
    /// removes the pair's edge whatever state it is in.
    pub async fn decline_request(&self, requester: &UserId) -> GraphResult<()> {
        self.delete_edge(requester, RelationAction::Decline).await
    }

    /// Withdraw a request the viewer sent to `target`
    pub async fn cancel_request(&self, target: &UserId) -> GraphResult<()> {
        self.delete_edge(target, RelationAction::Cancel).await
    }

    pub async fn remove_connection(&self, target: &UserId) -> GraphResult<()> {
        self.delete_edge(target, RelationAction::Remove).await
    }

    /// Delete-if-exists from any state; repeating it is never an error.
    ///
    /// The snapshot is not consulted, so a stale view cannot block a delete.
    async fn delete_edge(&self, other: &UserId, action: RelationAction) -> GraphResult<()> {
        let viewer = self.participant(other)?;
        let id = edge_id(&viewer, other);

        debug!(edge_id = %id, user_id = %viewer, action = %action, "Deleting connection edge");
        self.store.delete(Collection::Connections, &id).await?;

        let existed = self.write_edges().remove(&id).is_some();
        info!(edge_id = %id, user_id = %viewer, action = %action, existed, "Connection edge deleted");
        Ok(())
    }

    fn edges_where<F>(&self, mut keep: F) -> Vec<ConnectionEdge>
    where
        F: FnMut(&UserId, &ConnectionEdge) -> bool,
    {
        let Some(viewer) = self.identity.current_viewer_id() else {
            return Vec::new();
        };
        self.read_edges()
            .values()
            .filter(|edge| edge.involves(&viewer) && keep(&viewer, *edge))
            .cloned()
            .collect()
    }

    /// Users the viewer is connected with
    pub fn connections(&self) -> Vec<UserId> {
        let Some(viewer) = self.identity.current_viewer_id() else {
            return Vec::new();
        };
        self.edges_where(|_, edge| edge.status == EdgeStatus::Connected)
            .iter()
            .filter_map(|edge| edge.other(&viewer).cloned())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.edges_where(|_, edge| edge.status == EdgeStatus::Connected)
            .len()
    }

    /// Pending requests other users sent to the viewer
    pub fn incoming_requests(&self) -> Vec<ConnectionEdge> {
        self.edges_where(|viewer, edge| {
            edge.status == EdgeStatus::Pending && edge.requester_id != *viewer
        })
    }

    /// Pending requests the viewer sent
    pub fn outgoing_requests(&self) -> Vec<ConnectionEdge> {
        self.edges_where(|viewer, edge| {
            edge.status == EdgeStatus::Pending && edge.requester_id == *viewer
        })
    }

    /// "People you may know": candidates in their given order, minus the
    /// viewer and anyone already sharing an edge with them.
    pub fn suggestions<'a, I>(&self, candidates: I, limit: usize) -> Vec<UserId>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let Some(viewer) = self.identity.current_viewer_id() else {
            return Vec::new();
        };

        let related: HashSet<String> = self.read_edges().keys().cloned().collect();
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|candidate| **candidate != viewer)
            .filter(|candidate| !related.contains(&edge_id(&viewer, candidate)))
            .filter(|candidate| seen.insert((*candidate).clone()))
            .take(limit)
            .cloned()
            .collect()
    }
}
