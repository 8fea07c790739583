//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the place for
//! cross-cutting concerns: tracing, rate limiting, correlation ids, fault
//! recovery and metrics. Each layer is an object implementing [`Middleware`];
//! the router keeps them in an ordered list and runs them as a [`Chain`]:
//!
//! ```text
//!  before ──▶ metrics ─▶ trace ─▶ rate_limit ─▶ correlation ─▶ recover ─▶ handler
//!  after  ◀── metrics ◀─ trace ◀─ rate_limit ◀─ correlation ◀─ recover ◀──┘
//! ```
//!
//! - `before` runs outermost first. Returning `Some(response)` stops the walk:
//!   later layers and the handler are skipped.
//! - `after` runs innermost first for **every** layer, including those whose
//!   `before` never ran because an outer layer short-circuited. It is a
//!   `finally`, not a mirror of `before`.
//! - `on_fault` is offered every panic caught anywhere in the chain, innermost
//!   layer first. The first response returned replaces whatever was in flight.
//!
//! Every hook and the handler run under a fault boundary, so a panic in a
//! layer is recovered exactly like a panic in a handler.

mod correlation;
mod metrics;
mod rate_limit;
mod recover;
mod trace;

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use http::StatusCode;
use tracing::{Instrument, debug, error, info_span};

use crate::context::Context;
use crate::envelope::respond_error;
use crate::handler::SharedHandler;
use crate::request::Request;
use crate::response::Response;

pub use correlation::{CORRELATION_ID_HEADER, CorrelationId, get as correlation_id};
pub use metrics::Metrics;
pub use rate_limit::{RateLimit, TokenBucket};
pub use recover::Recover;
pub use trace::Trace;

/// A request interceptor. All hooks are optional.
pub trait Middleware: Send + Sync + 'static {
    /// Short, stable name used in logs.
    fn name(&self) -> &'static str;

    fn before(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    fn after(&self, _ctx: &mut Context, _res: &mut Response) {}

    fn on_fault(&self, _ctx: &Context, _fault: &Fault) -> Option<Response> {
        None
    }
}

/// A panic caught by the chain, reduced to its message.
#[derive(Debug)]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_owned(),
                Err(_) => "non-string panic payload".to_owned(),
            },
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The ordered middleware list plus the logic that walks it.
#[derive(Default)]
pub(crate) struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub(crate) fn push(&mut self, layer: impl Middleware) {
        self.layers.push(Arc::new(layer));
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Runs one request through every layer and `handler`.
    pub(crate) async fn run(&self, mut req: Request, handler: SharedHandler) -> Response {
        let mut early = None;
        for layer in &self.layers {
            match catch_unwind(AssertUnwindSafe(|| layer.before(&mut req))) {
                Ok(None) => {}
                Ok(Some(res)) => {
                    debug!(layer = layer.name(), status = res.status_code().as_u16(), "short-circuited");
                    early = Some(res);
                    break;
                }
                Err(payload) => {
                    early = Some(self.recover(req.context(), Fault::from_panic(payload)));
                    break;
                }
            }
        }

        let mut ctx = req.context().clone();

        let mut res = match early {
            Some(res) => res,
            None => self.dispatch(handler, req, &ctx).await,
        };

        for layer in self.layers.iter().rev() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| layer.after(&mut ctx, &mut res))) {
                res = self.recover(&ctx, Fault::from_panic(payload));
            }
        }

        res
    }

    async fn dispatch(&self, handler: SharedHandler, req: Request, ctx: &Context) -> Response {
        let span = info_span!(
            "request",
            route = ctx.route(),
            correlation_id = %ctx.correlation_id(),
        );
        match tokio::spawn(handler.call(req).instrument(span)).await {
            Ok(res) => res,
            Err(e) if e.is_panic() => self.recover(ctx, Fault::from_panic(e.into_panic())),
            Err(e) => self.recover(ctx, Fault::new(format!("handler task failed: {e}"))),
        }
    }

    /// Offers `fault` to every layer, innermost first, and returns the first
    /// response produced. Falls back to a bare 500 envelope when no layer
    /// converts it.
    fn recover(&self, ctx: &Context, fault: Fault) -> Response {
        let mut recovered = None;
        for layer in self.layers.iter().rev() {
            let res = catch_unwind(AssertUnwindSafe(|| layer.on_fault(ctx, &fault)));
            if recovered.is_none() {
                recovered = res.ok().flatten();
            }
        }
        recovered.unwrap_or_else(|| {
            error!(
                route = ctx.route(),
                correlation_id = %ctx.correlation_id(),
                fault = %fault,
                "fault reached the chain boundary unconverted"
            );
            respond_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }
}
