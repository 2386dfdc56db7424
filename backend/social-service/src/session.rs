//! Signed-in session: one identity, one store, and the components that
//! hold snapshots of it.
//!
//! Pushed result sets are routed by collection; [`Session::spawn_sync`]
//! wires the live queries to that routing.

use crate::domain::models::UserProfile;
use crate::error::ServiceResult;
use crate::feed::Feed;
use crate::profile::ProfileService;
use document_store::{Collection, Document, DocumentStore, Subscription};
use graph_service::{ConnectionGraph, GraphConfig};
use identity_core::IdentityProvider;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Reported after every applied snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotApplied {
    pub collection: Collection,
    pub documents: usize,
    pub kept: usize,
}

const UPDATE_BUFFER: usize = 64;

/// Running live-query listeners. Dropping the handle stops them.
#[derive(Debug)]
pub struct SyncHandle {
    tasks: Vec<JoinHandle<()>>,
    updates: mpsc::Receiver<SnapshotApplied>,
}

impl SyncHandle {
    /// Next applied snapshot, or `None` once every listener has stopped
    pub async fn next_update(&mut self) -> Option<SnapshotApplied> {
        self.updates.recv().await
    }

    pub fn shutdown(self) {
        info!(listeners = self.tasks.len(), "Stopping live sync");
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct Session {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    graph: ConnectionGraph,
    feed: Feed,
    profiles: ProfileService,
}

impl Session {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        config: GraphConfig,
    ) -> Self {
        Self {
            graph: ConnectionGraph::new(store.clone(), identity.clone(), config),
            feed: Feed::new(store.clone(), identity.clone()),
            profiles: ProfileService::new(store.clone(), identity.clone()),
            identity,
            store,
        }
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    /// Hand a pushed result set to the component that owns `collection`
    pub fn apply_snapshot(&self, collection: Collection, documents: &[Document]) -> usize {
        match collection {
            Collection::Connections => self.graph.apply_snapshot(documents),
            Collection::Posts => self.feed.apply_snapshot(documents),
            Collection::Users => self.profiles.apply_snapshot(documents),
        }
    }

    /// People you may know, drawn from the user directory
    pub fn suggestions(&self) -> Vec<UserProfile> {
        let candidates = self.profiles.directory_ids();
        self.graph
            .suggestions(&candidates, self.graph.config().suggestion_limit)
            .iter()
            .filter_map(|id| self.profiles.directory_profile(id))
            .collect()
    }

    /// One-shot read of every collection the session watches
    pub async fn refresh(&self) -> ServiceResult<()> {
        self.graph.refresh().await?;
        self.feed.refresh().await?;
        let users = self.store.query(&ProfileService::watch_query()).await?;
        self.profiles.apply_snapshot(&users);
        Ok(())
    }

    /// Subscribe to connections, posts and users and keep applying pushed
    /// result sets until the handle is dropped.
    pub async fn spawn_sync(self: &Arc<Self>) -> ServiceResult<SyncHandle> {
        let viewer = self.identity.require_viewer()?;

        let watches = [
            (Collection::Connections, ConnectionGraph::watch_query(&viewer.id)),
            (Collection::Posts, Feed::watch_query()),
            (Collection::Users, ProfileService::watch_query()),
        ];

        let mut subscriptions = Vec::with_capacity(watches.len());
        for (collection, query) in watches {
            subscriptions.push((collection, self.store.subscribe(query).await?));
        }

        let (tx, updates) = mpsc::channel(UPDATE_BUFFER);
        let tasks = subscriptions
            .into_iter()
            .map(|(collection, subscription)| {
                tokio::spawn(listen(Arc::clone(self), collection, subscription, tx.clone()))
            })
            .collect();

        info!(user_id = %viewer.id, "Live sync started");
        Ok(SyncHandle { tasks, updates })
    }
}

async fn listen(
    session: Arc<Session>,
    collection: Collection,
    mut subscription: Subscription,
    updates: mpsc::Sender<SnapshotApplied>,
) {
    while let Some(documents) = subscription.next().await {
        let kept = session.apply_snapshot(collection, &documents);
        let applied = SnapshotApplied {
            collection,
            documents: documents.len(),
            kept,
        };
        if kept < documents.len() {
            warn!(collection = %collection, skipped = documents.len() - kept, "Snapshot had malformed documents");
        }

        // Best effort: reports are dropped while the reader lags
        if updates.try_send(applied).is_err() {
            debug!(collection = %collection, "Snapshot report dropped");
        }
    }
    error!(collection = %collection, "Live query closed");
}
