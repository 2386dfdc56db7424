//! Document store collaborator for the Linkup client core.
//!
//! Entities live in per-kind collections (`users`, `posts`, `connections`)
//! as loosely typed JSON documents. The core never talks to a backend
//! directly; it goes through [`DocumentStore`]:
//!
//! ```text
//! core operation
//!   1. build a Patch (Set / ArrayUnion / Increment / ServerTimestamp ...)
//!   2. store.set / update / delete          (last write wins per document)
//!      ↓
//! change notice (broadcast channel or Redis PUBLISH)
//!      ↓
//! every live Subscription on that collection
//!   3. re-runs its Query
//!   4. pushes the full result set to the consumer
//! ```
//!
//! There are no cross-document transactions and no server-side uniqueness
//! guarantees beyond the document id.
//!
//! # Example
//!
//! ```
//! use document_store::{Collection, DocumentStore, MemoryStore, Patch, Query};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store
//!     .set(Collection::Posts, "p1", Patch::new().set("content", json!("hello")))
//!     .await
//!     .unwrap();
//!
//! let mut live = store.subscribe(Query::collection(Collection::Posts)).await.unwrap();
//! let snapshot = live.next().await.unwrap();
//! assert_eq!(snapshot.len(), 1);
//! # });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

mod error;
mod memory;
mod patch;
mod query;
mod redis_store;
mod subscription;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use patch::{FieldOp, Patch};
pub use query::{Filter, OrderBy, Query};
pub use redis_store::RedisStore;
pub use subscription::Subscription;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Collections known to the client core
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Posts,
    Connections,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Posts, Collection::Connections];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Posts => "posts",
            Collection::Connections => "connections",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document: its id plus free-form fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// What happened to a document, as carried on the change feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Update,
    Delete,
}

/// Change notification broadcast after every successful write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeNotice {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

/// Point reads/writes by id plus live queries.
///
/// Writes resolve [`FieldOp::ServerTimestamp`] at write time. `update` fails
/// with [`StoreError::NotFound`] when the document does not exist; `delete`
/// of a missing document succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Replace the whole document (creating it if needed)
    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()>;

    /// Create a document under a generated id and return the id
    async fn add(&self, collection: Collection, patch: Patch) -> StoreResult<String>;

    /// Merge the patch into an existing document
    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()>;

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Live query: yields the current result set, then a fresh one after
    /// every change to the queried collection.
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription>;
}
