//! In-process document store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    DeleteResult, Document, DocumentStore, Filter, ID_FIELD, InsertOneResult, ObjectId, StoreError,
    Update, UpdateResult, object_id_value,
};

/// Keeps every namespace as an insertion-ordered list of documents behind one
/// lock. The lock is never held across an `.await`.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find(&self, namespace: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let namespaces = self.namespaces.read();
        let docs = namespaces.get(namespace).map(Vec::as_slice).unwrap_or_default();
        Ok(docs.iter().filter(|d| filter.matches(d)).cloned().collect())
    }

    async fn find_one(&self, namespace: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let namespaces = self.namespaces.read();
        let docs = namespaces.get(namespace).map(Vec::as_slice).unwrap_or_default();
        Ok(docs.iter().find(|d| filter.matches(d)).cloned())
    }

    async fn insert_one(&self, namespace: &str, mut doc: Document) -> Result<InsertOneResult, StoreError> {
        let id = match doc.get(ID_FIELD).filter(|id| !id.is_null()).cloned() {
            Some(id) => id,
            None => {
                let id = object_id_value(ObjectId::new());
                doc.insert(ID_FIELD.to_owned(), id.clone());
                id
            }
        };

        let mut namespaces = self.namespaces.write();
        let docs = namespaces.entry(namespace.to_owned()).or_default();
        if docs.iter().any(|d| d.get(ID_FIELD) == Some(&id)) {
            return Err(StoreError::DuplicateKey(id));
        }
        docs.push(doc);
        Ok(InsertOneResult { inserted_id: id })
    }

    async fn update_one(
        &self,
        namespace: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        if update.set.contains_key(ID_FIELD) {
            return Err(StoreError::InvalidDocument(format!("field `{ID_FIELD}` is immutable")));
        }

        let mut namespaces = self.namespaces.write();
        let Some(doc) = namespaces
            .get_mut(namespace)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
        else {
            return Ok(UpdateResult::default());
        };

        let mut modified = false;
        for (key, value) in update.set {
            if doc.get(&key) != Some(&value) {
                doc.insert(key, value);
                modified = true;
            }
        }
        Ok(UpdateResult { matched_count: 1, modified_count: u64::from(modified) })
    }

    async fn delete_one(&self, namespace: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let mut namespaces = self.namespaces.write();
        let Some(docs) = namespaces.get_mut(namespace) else {
            return Ok(DeleteResult::default());
        };
        match docs.iter().position(|d| filter.matches(d)) {
            Some(index) => {
                docs.remove(index);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }
}
