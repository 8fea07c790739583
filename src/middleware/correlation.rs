//! Correlation id assignment.
//!
//! Every request gets a fresh UUID v4. It is written to the request headers
//! (for anything that re-reads them), the request [`Context`] (for logging)
//! and the response headers (for the caller).

use http::{HeaderName, HeaderValue};
use tracing::debug;

use crate::context::Context;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Returns the correlation id carried by `ctx`, or `""` when none was
/// assigned.
pub fn get(ctx: &Context) -> &str {
    ctx.correlation_id()
}

fn generate() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct CorrelationId;

impl Middleware for CorrelationId {
    fn name(&self) -> &'static str {
        "correlation_id"
    }

    fn before(&self, req: &mut Request) -> Option<Response> {
        let id = generate();
        // A hyphenated UUID is always a valid header value.
        if let Ok(value) = HeaderValue::from_str(&id) {
            req.set_header(HeaderName::from_static(CORRELATION_ID_HEADER), value);
        }
        debug!(route = req.context().route(), correlation_id = %id, "assigned correlation id");
        req.context_mut().set_correlation_id(id);
        None
    }

    /// Echoes the id on the response. Requests that were turned away before
    /// reaching this layer get one minted here, so no response leaves without
    /// the header.
    fn after(&self, ctx: &mut Context, res: &mut Response) {
        if ctx.correlation_id().is_empty() {
            ctx.set_correlation_id(generate());
        }
        if let Ok(value) = HeaderValue::from_str(ctx.correlation_id()) {
            res.set_header(HeaderName::from_static(CORRELATION_ID_HEADER), value);
        }
    }
}
