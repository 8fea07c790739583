use tracing::error;

use super::{Error, User, UserRepository};
use crate::context::Context;
use crate::store::as_object_id;

/// Business layer over [`UserRepository`].
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    pub async fn list(&self, ctx: &Context) -> Result<Vec<User>, Error> {
        let (ctx, _span) = ctx.child_span("UserService.list");
        self.repo.find_all(&ctx).await
    }

    /// Stores `user` and returns it with the generated id filled in.
    pub async fn create(&self, ctx: &Context, mut user: User) -> Result<User, Error> {
        let (ctx, _span) = ctx.child_span("UserService.create");

        let result = self.repo.insert(&ctx, &user).await?;
        let Some(id) = as_object_id(&result.inserted_id) else {
            error!(correlation_id = %ctx.correlation_id(), inserted_id = %result.inserted_id, "failed to convert inserted id to ObjectId");
            return Err(Error::UnexpectedInsertedId(result.inserted_id));
        };
        user.id = id.to_hex();
        Ok(user)
    }

    pub async fn get(&self, ctx: &Context, id: &str) -> Result<User, Error> {
        let (ctx, _span) = ctx.child_span("UserService.get");
        self.repo.find_by_id(&ctx, id).await
    }

    pub async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        let (ctx, _span) = ctx.child_span("UserService.delete");
        self.repo.delete_by_id(&ctx, id).await
    }

    /// Writes `user`'s fields, then returns the stored record as re-read.
    pub async fn update(&self, ctx: &Context, id: &str, user: User) -> Result<User, Error> {
        let (ctx, _span) = ctx.child_span("UserService.update");

        self.repo.update_by_id(&ctx, id, &user).await?;
        self.repo.find_by_id(&ctx, id).await
    }
}
