//! The `User` resource: model, persistence, business layer and HTTP handlers.
//!
//! ```text
//! handlers ──▶ UserService ──▶ UserRepository ──▶ Collection("users")
//!   (status codes)   (id extraction,        (ObjectId ⇄ hex,
//!                     re-read on update)     document mapping)
//! ```

pub mod handlers;
mod repository;
mod service;

use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Deserializer, Serialize};

pub use repository::UserRepository;
pub use service::UserService;

use crate::router::Router;
use crate::store::{ParseObjectIdError, StoreError};

/// Collection holding user documents.
pub const COLLECTION: &str = "users";

/// A user as the API sees it.
///
/// `id` is the hex form of the store's `ObjectId`. It is ignored on input and
/// populated on every output. Missing and `null` fields decode as empty
/// strings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub email: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Everything that can go wrong below the handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid user id `{id}`: {source}")]
    InvalidId {
        id: String,
        source: ParseObjectIdError,
    },
    #[error("user `{0}` not found")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed user document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("store generated an id that is not an ObjectId: {0}")]
    UnexpectedInsertedId(serde_json::Value),
    #[error("stored user has an id that is not an ObjectId: {0}")]
    UnexpectedStoredId(serde_json::Value),
}

/// Registers the five `/users` routes.
pub fn routes(router: Router, service: Arc<UserService>) -> Router {
    let list = Arc::clone(&service);
    let create = Arc::clone(&service);
    let get = Arc::clone(&service);
    let update = Arc::clone(&service);
    let delete = service;

    router
        .on(Method::GET, "/users", "users.list", move |req| handlers::list(Arc::clone(&list), req))
        .on(Method::POST, "/users", "users.create", move |req| handlers::create(Arc::clone(&create), req))
        .on(Method::GET, "/users/{id}", "users.get", move |req| handlers::get(Arc::clone(&get), req))
        .on(Method::PUT, "/users/{id}", "users.update", move |req| handlers::update(Arc::clone(&update), req))
        .on(Method::DELETE, "/users/{id}", "users.delete", move |req| handlers::delete(Arc::clone(&delete), req))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_fields_decode_as_empty() {
        let user: User = serde_json::from_value(json!({"name": "ada"})).unwrap();
        assert_eq!(user, User { id: String::new(), name: "ada".into(), email: String::new() });
    }

    #[test]
    fn null_fields_decode_as_empty() {
        let user: User = serde_json::from_value(json!({"id": null, "name": "ada", "email": null})).unwrap();
        assert_eq!(user, User { id: String::new(), name: "ada".into(), email: String::new() });
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        assert!(serde_json::from_value::<User>(json!({"name": 7})).is_err());
        assert!(serde_json::from_value::<User>(json!({"id": 7})).is_err());
        assert!(serde_json::from_value::<User>(json!("not an object")).is_err());
    }
}
