//! Fault recovery.

use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::envelope::respond_error;
use crate::middleware::{Fault, Middleware};
use crate::response::Response;

/// Turns any fault caught by the chain into `500 Internal Server Error` with
/// the standard envelope, and logs what happened.
///
/// The chain catches panics from every layer, not only from the ones inside
/// this one, so the position of `Recover` in the list only decides which
/// `after` hooks see the converted response (all of them do today).
pub struct Recover;

impl Middleware for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn on_fault(&self, ctx: &Context, fault: &Fault) -> Option<Response> {
        error!(
            route = ctx.route(),
            correlation_id = %ctx.correlation_id(),
            fault = %fault,
            "recovered from panic"
        );
        Some(respond_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
    }
}
