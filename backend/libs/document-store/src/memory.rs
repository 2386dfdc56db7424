//! In-process document store backed by a broadcast change feed

use crate::{
    ChangeKind, ChangeNotice, Collection, Document, DocumentStore, Patch, Query, StoreError,
    StoreResult, Subscription,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};

type Collections = HashMap<Collection, BTreeMap<String, Map<String, Value>>>;

struct Inner {
    documents: RwLock<Collections>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl Inner {
    async fn snapshot(&self, query: &Query) -> Vec<Document> {
        let documents = self.documents.read().await;
        let docs = documents
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.run(docs)
    }

    fn notify(&self, collection: Collection, id: &str, kind: ChangeKind) {
        // No receivers simply means nobody is subscribed
        let _ = self.changes.send(ChangeNotice {
            collection,
            id: id.to_string(),
            kind,
        });
    }
}

/// Shared, cloneable in-memory store.
///
/// Used for tests and for running the client without a backend.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Change notices buffered per subscriber before it is considered lagging
    pub const CHANGE_BUFFER: usize = 256;

    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(Self::CHANGE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    /// Number of documents currently stored in `collection`
    pub async fn len(&self, collection: Collection) -> usize {
        self.inner
            .documents
            .read()
            .await
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let documents = self.inner.documents.read().await;
        Ok(documents
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let fields = patch.into_fields(Utc::now());
        {
            let mut documents = self.inner.documents.write().await;
            documents
                .entry(collection)
                .or_default()
                .insert(id.to_string(), fields);
        }
        debug!(collection = %collection, id = %id, "Document set");
        self.inner.notify(collection, id, ChangeKind::Set);
        Ok(())
    }

    async fn add(&self, collection: Collection, patch: Patch) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.set(collection, &id, patch).await?;
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        {
            let mut documents = self.inner.documents.write().await;
            let fields = documents
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            patch.apply(fields, Utc::now());
        }
        debug!(collection = %collection, id = %id, "Document updated");
        self.inner.notify(collection, id, ChangeKind::Update);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let removed = {
            let mut documents = self.inner.documents.write().await;
            documents
                .get_mut(&collection)
                .and_then(|docs| docs.remove(id))
                .is_some()
        };
        if removed {
            debug!(collection = %collection, id = %id, "Document deleted");
            self.inner.notify(collection, id, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        Ok(self.inner.snapshot(query).await)
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        // Subscribe before the first read so no change can slip in between
        let mut changes = self.inner.changes.subscribe();
        let (tx, rx) = mpsc::channel(Subscription::BUFFER);

        let initial = self.inner.snapshot(&query).await;
        tx.send(initial)
            .await
            .map_err(|_| StoreError::SubscriptionClosed)?;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(notice) if notice.collection != query.collection => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            collection = %query.collection,
                            skipped,
                            "Live query lagged; resending current result set"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let docs = inner.snapshot(&query).await;
                if tx.send(docs).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, handle))
    }
}
