//! HTTP handlers for `/users`.
//!
//! Handlers are the only layer that picks status codes. Error text is kept
//! generic; the detail goes to the log.

use std::sync::Arc;

use http::StatusCode;
use tracing::{error, info};

use super::{User, UserService};
use crate::envelope::{respond_error, respond_json};
use crate::request::Request;
use crate::response::Response;

const INVALID_PAYLOAD: &str = "Invalid request payload";

/// Decodes a user payload. A `null` body is an empty user.
fn payload(req: &Request) -> Result<User, serde_json::Error> {
    req.json::<Option<User>>().map(Option::unwrap_or_default)
}

pub async fn list(service: Arc<UserService>, req: Request) -> Response {
    let (ctx, _span) = req.context().child_span("users.list.handler");

    match service.list(&ctx).await {
        Ok(users) => {
            info!(correlation_id = %ctx.correlation_id(), count = users.len(), "users retrieved");
            respond_json(StatusCode::OK, users)
        }
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), "error retrieving users: {e}");
            respond_error(StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving users")
        }
    }
}

pub async fn create(service: Arc<UserService>, req: Request) -> Response {
    let (ctx, _span) = req.context().child_span("users.create.handler");

    let user = match payload(&req) {
        Ok(user) => user,
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), "invalid create payload: {e}");
            return respond_error(StatusCode::BAD_REQUEST, INVALID_PAYLOAD);
        }
    };

    match service.create(&ctx, user).await {
        Ok(user) => {
            info!(correlation_id = %ctx.correlation_id(), user_id = %user.id, "user created");
            respond_json(StatusCode::CREATED, user)
        }
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), "error creating user: {e}");
            respond_error(StatusCode::INTERNAL_SERVER_ERROR, "Error creating user")
        }
    }
}

pub async fn get(service: Arc<UserService>, req: Request) -> Response {
    let (ctx, _span) = req.context().child_span("users.get.handler");
    let id = req.param("id").unwrap_or_default();

    match service.get(&ctx, id).await {
        Ok(user) => respond_json(StatusCode::OK, user),
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), user_id = id, "error fetching user: {e}");
            respond_error(StatusCode::NOT_FOUND, "User not found")
        }
    }
}

pub async fn delete(service: Arc<UserService>, req: Request) -> Response {
    let (ctx, _span) = req.context().child_span("users.delete.handler");
    let id = req.param("id").unwrap_or_default();

    match service.delete(&ctx, id).await {
        Ok(()) => {
            info!(correlation_id = %ctx.correlation_id(), user_id = id, "user deleted");
            Response::status(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), user_id = id, "error deleting user: {e}");
            respond_error(StatusCode::NOT_FOUND, "Error deleting user")
        }
    }
}

pub async fn update(service: Arc<UserService>, req: Request) -> Response {
    let (ctx, _span) = req.context().child_span("users.update.handler");
    let id = req.param("id").unwrap_or_default();

    let user = match payload(&req) {
        Ok(user) => user,
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), user_id = id, "invalid update payload: {e}");
            return respond_error(StatusCode::BAD_REQUEST, INVALID_PAYLOAD);
        }
    };

    match service.update(&ctx, id, user).await {
        Ok(user) => {
            info!(correlation_id = %ctx.correlation_id(), user_id = id, "user updated");
            respond_json(StatusCode::OK, user)
        }
        Err(e) => {
            error!(correlation_id = %ctx.correlation_id(), user_id = id, "error updating user: {e}");
            respond_error(StatusCode::NOT_FOUND, "Error updating user")
        }
    }
}
