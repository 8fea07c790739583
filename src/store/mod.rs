//! Document store client.
//!
//! The service only ever talks to the store through [`DocumentStore`], a
//! narrow collection-level interface: find, insert, update and delete by
//! native identifier. [`connect`] builds the one [`Database`] handle the
//! process uses; everything that needs the store receives a clone of it.
//!
//! Two backends ship: [`MongoStore`] for `mongodb://` URIs and the
//! in-process [`MemoryStore`] for `memory://`.
//!
//! Documents are JSON objects in MongoDB extended JSON. The native
//! identifier lives under [`ID_FIELD`] and is an [`ObjectId`], written as
//! `{"$oid": "<hex>"}`, unless the caller supplied something else.

mod memory;
mod mongo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

pub use bson::oid::{Error as ParseObjectIdError, ObjectId};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Field holding a document's native identifier.
pub const ID_FIELD: &str = "_id";

/// Extended-JSON key under which an [`ObjectId`] is written.
pub const OID_KEY: &str = "$oid";

pub type Document = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported store uri `{0}`")]
    UnsupportedUri(String),
    #[error("timed out after {0:?} waiting for the store")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate key {0}")]
    DuplicateKey(Value),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("namespace `{0}` is not `<database>.<collection>`")]
    InvalidNamespace(String),
    #[error("mongodb: {0}")]
    Driver(#[from] mongodb::error::Error),
}

/// `{"$oid": "<hex>"}`.
pub fn object_id_value(id: ObjectId) -> Value {
    Value::Object(Map::from_iter([(OID_KEY.to_owned(), Value::String(id.to_hex()))]))
}

/// Reads an id written as `{"$oid": "<hex>"}`. Anything else is `None`.
pub fn as_object_id(value: &Value) -> Option<ObjectId> {
    ObjectId::parse_str(value.get(OID_KEY)?.as_str()?).ok()
}

/// Which documents an operation applies to.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All,
    /// Documents whose [`ID_FIELD`] equals the value.
    Id(Value),
}

impl Filter {
    pub fn by_object_id(id: ObjectId) -> Self {
        Self::Id(object_id_value(id))
    }

    pub(crate) fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => doc.get(ID_FIELD) == Some(id),
        }
    }
}

/// `$set`-style partial update: listed fields are overwritten, others kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub set: Document,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// What the service needs from a document database.
///
/// `namespace` is `"<database>.<collection>"`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find(&self, namespace: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    async fn find_one(&self, namespace: &str, filter: &Filter) -> Result<Option<Document>, StoreError>;

    /// Inserts `doc`, generating an [`ObjectId`] when it has no [`ID_FIELD`].
    async fn insert_one(&self, namespace: &str, doc: Document) -> Result<InsertOneResult, StoreError>;

    async fn update_one(
        &self,
        namespace: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<UpdateResult, StoreError>;

    async fn delete_one(&self, namespace: &str, filter: &Filter) -> Result<DeleteResult, StoreError>;
}

/// Handle to one database inside a store. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
    name: Arc<str>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self { store, name: Arc::from(name.into()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            store: Arc::clone(&self.store),
            namespace: format!("{}.{name}", self.name),
        }
    }
}

/// Handle to one collection.
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    namespace: String,
}

impl Collection {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.store.find(&self.namespace, filter).await
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        self.store.find_one(&self.namespace, filter).await
    }

    pub async fn insert_one(&self, doc: Document) -> Result<InsertOneResult, StoreError> {
        self.store.insert_one(&self.namespace, doc).await
    }

    pub async fn update_one(&self, filter: &Filter, update: Update) -> Result<UpdateResult, StoreError> {
        self.store.update_one(&self.namespace, filter, update).await
    }

    pub async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.store.delete_one(&self.namespace, filter).await
    }
}

/// Opens the store named by `uri` and checks it answers a ping within
/// `timeout`. Called once at startup; callers treat failure as fatal.
///
/// Supported schemes: `mongodb://`, `mongodb+srv://` and `memory://`.
pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Database, StoreError> {
    let Some((scheme, _)) = uri.split_once("://") else {
        return Err(StoreError::UnsupportedUri(uri.to_owned()));
    };

    let open = async {
        let store: Arc<dyn DocumentStore> = match scheme {
            "memory" => Arc::new(MemoryStore::new()),
            "mongodb" | "mongodb+srv" => Arc::new(MongoStore::connect(uri, timeout).await?),
            _ => return Err(StoreError::UnsupportedUri(uri.to_owned())),
        };
        store.ping().await?;
        Ok::<_, StoreError>(store)
    };
    let store = tokio::time::timeout(timeout, open)
        .await
        .map_err(|_| StoreError::Timeout(timeout))??;

    info!(backend = scheme, database, "connected to document store");
    Ok(Database::new(store, database))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_accepts_memory_scheme() {
        let db = connect("memory://localhost", "myapp", Duration::from_secs(1)).await.unwrap();
        assert_eq!(db.name(), "myapp");
        assert_eq!(db.collection("users").namespace(), "myapp.users");
    }

    #[tokio::test]
    async fn connect_rejects_unknown_scheme() {
        for uri in ["redis://localhost:6379", "localhost:27017"] {
            let err = connect(uri, "myapp", Duration::from_secs(1)).await.err().unwrap();
            assert!(matches!(err, StoreError::UnsupportedUri(_)), "{uri}: {err}");
        }
    }

    #[tokio::test]
    async fn connect_hands_mongodb_uris_to_the_driver() {
        // Nothing listens on port 1, so server selection gives up.
        let err = connect("mongodb://127.0.0.1:1", "myapp", Duration::from_millis(300))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Timeout(_) | StoreError::Driver(_)), "{err}");
    }

    #[test]
    fn object_ids_are_written_as_extended_json() {
        let id = ObjectId::parse_str("650f1c2e9b1e8a3f4c2d1b0a").unwrap();
        let value = object_id_value(id);
        assert_eq!(value, serde_json::json!({"$oid": "650f1c2e9b1e8a3f4c2d1b0a"}));
        assert_eq!(as_object_id(&value), Some(id));

        assert_eq!(as_object_id(&serde_json::json!("650f1c2e9b1e8a3f4c2d1b0a")), None);
        assert_eq!(as_object_id(&serde_json::json!({"$oid": "xyz"})), None);
    }

    #[test]
    fn id_filter_matches_only_that_document() {
        let id = ObjectId::new();
        let filter = Filter::by_object_id(id);

        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_owned(), object_id_value(id));
        assert!(filter.matches(&doc));

        doc.insert(ID_FIELD.to_owned(), object_id_value(ObjectId::new()));
        assert!(!filter.matches(&doc));
        assert!(Filter::All.matches(&doc));
    }
}
