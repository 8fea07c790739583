use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use super::{COLLECTION, Error, User};
use crate::context::Context;
use crate::store::{
    Collection, Database, Document, Filter, ID_FIELD, InsertOneResult, ObjectId, Update, as_object_id,
};

/// Stored shape of a user, minus the id.
#[derive(Deserialize)]
struct UserDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

/// Fields written on insert and update. The external id is never written.
fn fields(user: &User) -> Document {
    Document::from_iter([
        ("name".to_owned(), Value::String(user.name.clone())),
        ("email".to_owned(), Value::String(user.email.clone())),
    ])
}

fn decode(mut doc: Document) -> Result<User, Error> {
    let id = match doc.remove(ID_FIELD) {
        None | Some(Value::Null) => String::new(),
        Some(id) => as_object_id(&id).ok_or(Error::UnexpectedStoredId(id))?.to_hex(),
    };
    let UserDocument { name, email } = serde_json::from_value(Value::Object(doc))?;
    Ok(User { id, name, email })
}

fn parse_id(id: &str) -> Result<ObjectId, Error> {
    ObjectId::parse_str(id).map_err(|source| {
        error!(id, "error converting id: {source}");
        Error::InvalidId { id: id.to_owned(), source }
    })
}

/// Direct access to the `users` collection. Every operation opens its own
/// child span and logs failures before returning them.
#[derive(Clone)]
pub struct UserRepository {
    collection: Collection,
}

impl UserRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection(COLLECTION) }
    }

    pub async fn find_all(&self, ctx: &Context) -> Result<Vec<User>, Error> {
        let (_ctx, _span) = ctx.child_span("UserRepository.find_all");

        let docs = self.collection.find(&Filter::All).await.map_err(|e| {
            error!(correlation_id = %ctx.correlation_id(), "error finding users: {e}");
            Error::from(e)
        })?;
        docs.into_iter().map(decode).collect::<Result<_, _>>().inspect_err(|e| {
            error!(correlation_id = %ctx.correlation_id(), "error decoding users: {e}");
        })
    }

    /// Inserts `user` (ignoring its `id`) and returns the raw insert result;
    /// interpreting the generated id is the caller's business.
    pub async fn insert(&self, ctx: &Context, user: &User) -> Result<InsertOneResult, Error> {
        let (_ctx, _span) = ctx.child_span("UserRepository.insert");

        let result = self.collection.insert_one(fields(user)).await.map_err(|e| {
            error!(correlation_id = %ctx.correlation_id(), "error creating user: {e}");
            Error::from(e)
        })?;
        debug!(correlation_id = %ctx.correlation_id(), inserted_id = %result.inserted_id, "user inserted");
        Ok(result)
    }

    pub async fn find_by_id(&self, ctx: &Context, id: &str) -> Result<User, Error> {
        let (_ctx, _span) = ctx.child_span("UserRepository.find_by_id");

        let object_id = parse_id(id)?;
        let doc = self
            .collection
            .find_one(&Filter::by_object_id(object_id))
            .await
            .map_err(|e| {
                error!(correlation_id = %ctx.correlation_id(), id, "error finding user by id: {e}");
                Error::from(e)
            })?
            .ok_or_else(|| {
                error!(correlation_id = %ctx.correlation_id(), id, "user not found");
                Error::NotFound(id.to_owned())
            })?;
        decode(doc)
    }

    pub async fn delete_by_id(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        let (_ctx, _span) = ctx.child_span("UserRepository.delete_by_id");

        let object_id = parse_id(id)?;
        let result = self
            .collection
            .delete_one(&Filter::by_object_id(object_id))
            .await
            .map_err(|e| {
                error!(correlation_id = %ctx.correlation_id(), id, "error deleting user by id: {e}");
                Error::from(e)
            })?;
        if result.deleted_count == 0 {
            error!(correlation_id = %ctx.correlation_id(), id, "no user to delete");
            return Err(Error::NotFound(id.to_owned()));
        }
        Ok(())
    }

    /// `$set`s name and email on the user with `id`.
    pub async fn update_by_id(&self, ctx: &Context, id: &str, user: &User) -> Result<(), Error> {
        let (_ctx, _span) = ctx.child_span("UserRepository.update_by_id");

        let object_id = parse_id(id)?;
        let update = Update { set: fields(user) };
        let result = self
            .collection
            .update_one(&Filter::by_object_id(object_id), update)
            .await
            .map_err(|e| {
                error!(correlation_id = %ctx.correlation_id(), id, "error updating user by id: {e}");
                Error::from(e)
            })?;
        if result.matched_count == 0 {
            error!(correlation_id = %ctx.correlation_id(), id, "no user to update");
            return Err(Error::NotFound(id.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn repository() -> UserRepository {
        UserRepository::new(&Database::new(Arc::new(MemoryStore::new()), "test"))
    }

    fn user(name: &str, email: &str) -> User {
        User { id: "ignored".into(), name: name.into(), email: email.into() }
    }

    #[test]
    fn fields_never_carry_the_id() {
        let doc = fields(&user("ada", "ada@example.com"));
        assert_eq!(Value::Object(doc), json!({"name": "ada", "email": "ada@example.com"}));
    }

    #[test]
    fn decode_renders_object_id_as_hex() {
        let doc = json!({"_id": {"$oid": "650f1c2e9b1e8a3f4c2d1b0a"}, "name": "ada", "email": "a@x"});
        let Value::Object(doc) = doc else { unreachable!() };
        assert_eq!(decode(doc).unwrap().id, "650f1c2e9b1e8a3f4c2d1b0a");
    }

    #[test]
    fn decode_rejects_ids_that_are_not_object_ids() {
        let Value::Object(doc) = json!({"_id": "plain", "name": "ada"}) else { unreachable!() };
        assert!(matches!(decode(doc), Err(Error::UnexpectedStoredId(_))));
    }

    #[tokio::test]
    async fn insert_then_find_by_hex_id() {
        let repo = repository();
        let ctx = Context::new("test");

        let result = repo.insert(&ctx, &user("ada", "ada@example.com")).await.unwrap();
        let id = as_object_id(&result.inserted_id).unwrap();

        let found = repo.find_by_id(&ctx, &id.to_hex()).await.unwrap();
        assert_eq!(found.id, id.to_hex());
        assert_eq!(found.name, "ada");
        assert_eq!(repo.find_all(&ctx).await.unwrap(), [found]);
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_errors() {
        let repo = repository();
        let ctx = Context::new("test");

        assert!(matches!(repo.find_by_id(&ctx, "nope").await, Err(Error::InvalidId { .. })));
        let unknown = ObjectId::new().to_hex();
        assert!(matches!(repo.find_by_id(&ctx, &unknown).await, Err(Error::NotFound(_))));
        assert!(matches!(repo.delete_by_id(&ctx, &unknown).await, Err(Error::NotFound(_))));
        assert!(matches!(
            repo.update_by_id(&ctx, &unknown, &user("a", "b")).await,
            Err(Error::NotFound(_))
        ));
    }
}
