//! Redis-backed document store with Pub/Sub change notification
//!
//! Layout:
//!
//! ```text
//! {prefix}:doc:{collection}:{id}   JSON object (SET / GET / DEL)
//! {prefix}:index:{collection}      set of document ids (SADD / SREM / SMEMBERS)
//! PUBLISH {channel} {"collection": "posts", "id": "...", "kind": "Update"}
//! ```
//!
//! `update` is read-modify-write without WATCH: concurrent writers to the
//! same document resolve as last write wins.

use crate::{
    ChangeKind, ChangeNotice, Collection, Document, DocumentStore, Patch, Query, StoreError,
    StoreResult, Subscription,
};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    key_prefix: String,
    channel: String,
}

impl RedisStore {
    pub const DEFAULT_KEY_PREFIX: &'static str = "linkup";
    pub const DEFAULT_CHANNEL: &'static str = "linkup:changes";

    /// Connect with the default key prefix and change channel
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        Self::with_namespace(
            redis_url,
            Self::DEFAULT_KEY_PREFIX.to_string(),
            Self::DEFAULT_CHANNEL.to_string(),
        )
        .await
    }

    pub async fn with_namespace(
        redis_url: &str,
        key_prefix: String,
        channel: String,
    ) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!(prefix = %key_prefix, channel = %channel, "Connected Redis document store");

        Ok(Self {
            client,
            conn,
            key_prefix,
            channel,
        })
    }

    fn doc_key(&self, collection: Collection, id: &str) -> String {
        format!("{}:doc:{}:{}", self.key_prefix, collection, id)
    }

    fn index_key(&self, collection: Collection) -> String {
        format!("{}:index:{}", self.key_prefix, collection)
    }

    async fn write(
        &self,
        collection: Collection,
        id: &str,
        fields: &Map<String, Value>,
        kind: ChangeKind,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(fields)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.doc_key(collection, id), payload)
            .await?;
        conn.sadd::<_, _, ()>(self.index_key(collection), id).await?;
        self.publish(collection, id, kind).await
    }

    async fn publish(&self, collection: Collection, id: &str, kind: ChangeKind) -> StoreResult<()> {
        let notice = ChangeNotice {
            collection,
            id: id.to_string(),
            kind,
        };
        let payload = serde_json::to_string(&notice)?;
        let mut conn = self.conn.clone();
        let receivers: usize = conn.publish(&self.channel, payload).await?;

        debug!(
            collection = %collection,
            id = %id,
            kind = ?kind,
            receivers,
            "Change notice published"
        );
        Ok(())
    }
}

fn parse_fields(raw: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidDocument(format!(
            "expected JSON object, got {}",
            other
        ))),
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.doc_key(collection, id)).await?;
        raw.map(|raw| parse_fields(&raw).map(|fields| Document::new(id, fields)))
            .transpose()
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let fields = patch.into_fields(Utc::now());
        self.write(collection, id, &fields, ChangeKind::Set).await
    }

    async fn add(&self, collection: Collection, patch: Patch) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.set(collection, &id, patch).await?;
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let mut fields = self
            .get(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?
            .fields;
        patch.apply(&mut fields, Utc::now());
        self.write(collection, id, &fields, ChangeKind::Update).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.doc_key(collection, id)).await?;
        conn.srem::<_, _, ()>(self.index_key(collection), id).await?;
        if removed > 0 {
            self.publish(collection, id, ChangeKind::Delete).await?;
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.index_key(query.collection)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.doc_key(query.collection, id))
            .collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut docs = Vec::with_capacity(ids.len());
        for (id, raw) in ids.into_iter().zip(raws) {
            // Index entries can outlive a document deleted by another client
            let Some(raw) = raw else { continue };
            match parse_fields(&raw) {
                Ok(fields) => docs.push(Document::new(id, fields)),
                Err(e) => {
                    warn!(collection = %query.collection, id = %id, error = %e, "Skipping malformed document");
                }
            }
        }

        Ok(query.run(docs))
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        info!(channel = %self.channel, collection = %query.collection, "Subscribed to document changes");

        let (tx, rx) = mpsc::channel(Subscription::BUFFER);
        let initial = self.query(&query).await?;
        tx.send(initial)
            .await
            .map_err(|_| StoreError::SubscriptionClosed)?;

        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = ?e, "Failed to get change notice payload");
                        continue;
                    }
                };

                let notice: ChangeNotice = match serde_json::from_str(&payload) {
                    Ok(n) => n,
                    Err(e) => {
                        error!(error = ?e, payload = %payload, "Failed to deserialize change notice");
                        continue;
                    }
                };

                if notice.collection != query.collection {
                    continue;
                }

                match store.query(&query).await {
                    Ok(docs) => {
                        if tx.send(docs).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(
                            error = ?e,
                            collection = %query.collection,
                            "Failed to refresh live query"
                        );
                    }
                }
            }

            warn!(collection = %query.collection, "Document change subscription ended");
        });

        Ok(Subscription::new(rx, handle))
    }
}
