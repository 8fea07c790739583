//! MongoDB backend.
//!
//! Documents cross the boundary as extended JSON: `serde_json` maps are
//! parsed into BSON on the way in (so `{"$oid": …}` becomes a real
//! ObjectId) and rendered back as relaxed extended JSON on the way out.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, Bson, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::debug;

use super::{
    DeleteResult, Document, DocumentStore, Filter, ID_FIELD, InsertOneResult, StoreError, Update,
    UpdateResult,
};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// A [`DocumentStore`] over the official MongoDB driver. The client keeps its
/// own connection pool, so one instance serves the whole process.
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Parses `uri` and builds a client. No connection is made until the
    /// first operation; `timeout` bounds connecting and server selection.
    pub async fn connect(uri: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.app_name.get_or_insert_with(|| "userd".to_owned());

        Ok(Self { client: Client::with_options(options)? })
    }

    fn collection(&self, namespace: &str) -> Result<Collection<bson::Document>, StoreError> {
        let (database, collection) = namespace
            .split_once('.')
            .ok_or_else(|| StoreError::InvalidNamespace(namespace.to_owned()))?;
        Ok(self.client.database(database).collection(collection))
    }
}

fn to_bson(value: Value) -> Result<Bson, StoreError> {
    Bson::try_from(value).map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

fn to_document(doc: Document) -> Result<bson::Document, StoreError> {
    match to_bson(Value::Object(doc))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(StoreError::InvalidDocument(format!("expected a document, got {other}"))),
    }
}

fn from_document(doc: bson::Document) -> Document {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn to_filter(filter: &Filter) -> Result<bson::Document, StoreError> {
    let mut query = bson::Document::new();
    if let Filter::Id(id) = filter {
        query.insert(ID_FIELD, to_bson(id.clone())?);
    }
    Ok(query)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client.database("admin").run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find(&self, namespace: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let mut cursor = self.collection(namespace)?.find(to_filter(filter)?).await?;
        let mut docs = Vec::new();
        while cursor.advance().await? {
            docs.push(from_document(cursor.deserialize_current()?));
        }
        debug!(namespace, count = docs.len(), "find");
        Ok(docs)
    }

    async fn find_one(&self, namespace: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let found = self.collection(namespace)?.find_one(to_filter(filter)?).await?;
        Ok(found.map(from_document))
    }

    async fn insert_one(&self, namespace: &str, doc: Document) -> Result<InsertOneResult, StoreError> {
        let id = doc.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        let result = self
            .collection(namespace)?
            .insert_one(to_document(doc)?)
            .await
            .map_err(|e| if is_duplicate_key(&e) { StoreError::DuplicateKey(id) } else { e.into() })?;
        Ok(InsertOneResult { inserted_id: result.inserted_id.into_relaxed_extjson() })
    }

    async fn update_one(
        &self,
        namespace: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        let set = to_document(update.set)?;
        let result = self
            .collection(namespace)?
            .update_one(to_filter(filter)?, doc! { "$set": set })
            .await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, namespace: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let result = self.collection(namespace)?.delete_one(to_filter(filter)?).await?;
        Ok(DeleteResult { deleted_count: result.deleted_count })
    }
}
