//! Request-scoped value bag.
//!
//! Middleware fills a [`Context`] in on the way in; handlers hand it to the
//! service, the service hands it to the repository. Nothing is looked up
//! ambiently: whatever a layer needs to log or trace arrives as an argument.

use std::fmt;
use std::time::{Duration, Instant};

use opentelemetry::trace::{SpanKind, SpanRef, TraceContextExt};

use crate::trace::{ActiveSpan, SpanContext, Tracer};

#[derive(Clone)]
pub struct Context {
    route: &'static str,
    correlation_id: String,
    scope: opentelemetry::Context,
    tracer: Option<Tracer>,
    started: Instant,
}

impl Context {
    pub fn new(route: &'static str) -> Self {
        Self {
            route,
            correlation_id: String::new(),
            scope: opentelemetry::Context::new(),
            tracer: None,
            started: Instant::now(),
        }
    }

    /// Logical operation name of the matched route (`users.get`, `not_found`, …).
    pub fn route(&self) -> &'static str {
        self.route
    }

    /// The request's correlation id, or `""` when none has been assigned.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = id.into();
    }

    /// The span new children should be parented to.
    pub fn span(&self) -> Option<SpanContext> {
        self.scope.has_active_span().then(|| self.scope.span().span_context().clone())
    }

    /// The current span, for tagging. A no-op span when none is attached.
    pub fn current_span(&self) -> SpanRef<'_> {
        self.scope.span()
    }

    /// Makes `span` the current span and `tracer` the source of its children.
    ///
    /// The span stays open after this returns. It ends when something calls
    /// `current_span().end()` or when the last context holding it is dropped.
    pub fn attach(&mut self, tracer: Tracer, span: ActiveSpan) {
        self.tracer = Some(tracer);
        self.scope = span.into_scope();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Opens a child of the current span and returns it together with a
    /// context in which it is current.
    ///
    /// Keep the span bound (`let (ctx, _span) = …`) for as long as the work
    /// it measures; it closes when dropped.
    pub fn child_span(&self, name: &str) -> (Context, ActiveSpan) {
        let mut ctx = self.clone();
        let span = match &self.tracer {
            Some(tracer) => {
                let span = tracer.start_in(name, &self.scope, SpanKind::Internal);
                ctx.scope = span.scope().clone();
                span
            }
            None => ActiveSpan::detached(),
        };
        (ctx, span)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("route", &self.route)
            .field("correlation_id", &self.correlation_id)
            .field("span", &self.span())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::SpanId;

    use super::*;
    use crate::trace::tests::Recorder;

    #[test]
    fn correlation_id_defaults_to_empty() {
        let ctx = Context::new("users.list");
        assert_eq!(ctx.correlation_id(), "");
        assert!(ctx.span().is_none());
    }

    #[test]
    fn child_spans_nest_under_the_current_span() {
        let recorder = Recorder::default();
        let tracer = recorder.tracer();
        let root = tracer.start("users.get", None);
        let root_id = root.context();

        let mut ctx = Context::new("users.get");
        ctx.set_correlation_id("abc");
        ctx.attach(tracer, root);

        let (handler_ctx, handler_span) = ctx.child_span("users.get.handler");
        let (repo_ctx, repo_span) = handler_ctx.child_span("UserRepository.find_by_id");

        assert_eq!(repo_ctx.correlation_id(), "abc");
        assert_eq!(repo_ctx.span().map(|s| s.trace_id()), Some(root_id.trace_id()));
        assert_eq!(repo_ctx.span(), Some(repo_span.context()));

        drop(repo_span);
        drop(handler_span);
        ctx.current_span().end();
        assert_eq!(
            recorder.names(),
            ["UserRepository.find_by_id", "users.get.handler", "users.get"]
        );

        let spans = recorder.spans();
        assert_eq!(spans[0].parent_span_id, spans[1].span_context.span_id());
        assert_eq!(spans[1].parent_span_id, root_id.span_id());
        assert_eq!(spans[2].parent_span_id, SpanId::INVALID);
    }

    #[test]
    fn child_span_without_tracer_keeps_the_parent_scope() {
        let ctx = Context::new("users.list");
        let (child, span) = ctx.child_span("users.list.handler");
        assert!(child.span().is_none());
        assert!(!span.context().is_valid());
    }
}
