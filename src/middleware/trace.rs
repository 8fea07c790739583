//! Root span per request.

use http::StatusCode;
use opentelemetry::KeyValue;
use opentelemetry::trace::Status;

use crate::context::Context;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::trace::Tracer;

/// Opens the request's root span, named after the matched route, and makes
/// it the current span in the request context.
///
/// `after` records the outcome on the root span and ends it, so the span
/// covers every inner layer and the handler whatever path the request took.
/// A 5xx or 429 marks the span as failed.
pub struct Trace {
    tracer: Tracer,
}

impl Trace {
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer }
    }
}

impl Middleware for Trace {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn before(&self, req: &mut Request) -> Option<Response> {
        let root = self.tracer.start(req.context().route(), None);
        root.tag("http.method", req.method().to_string());
        root.tag("http.path", req.path().to_owned());

        req.context_mut().attach(self.tracer.clone(), root);
        None
    }

    fn after(&self, ctx: &mut Context, res: &mut Response) {
        let span = ctx.current_span();
        let status = res.status_code();

        span.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
        span.set_attribute(KeyValue::new("http.response.size", res.body().len() as i64));
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            span.set_status(Status::error(status.to_string()));
        }
        span.end();
    }
}
