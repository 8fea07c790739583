//! Distributed-trace spans on OpenTelemetry, exported to a Zipkin collector.
//!
//! A [`Tracer`] starts spans; an [`ActiveSpan`] is an RAII guard that ends
//! the span when it is finished or dropped, including on early return and
//! during unwinding.
//!
//! ```text
//! users.create                      root   (trace layer)
//! └── users.create.handler          child  (handler)
//!     └── UserService.create        child  (service)
//!         └── UserRepository.insert child  (repository)
//! ```
//!
//! Every span in the tree shares the root's [`TraceId`]. Parents are passed
//! explicitly through [`Context`](crate::Context); nothing reads the
//! thread-local OpenTelemetry context.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracer, SdkTracerProvider, SpanExporter,
    TracerProviderBuilder,
};
use opentelemetry_zipkin::ZipkinExporter;
use tracing::info;

use crate::error::Error;

pub use opentelemetry::trace::{SpanContext, SpanId, TraceId};

/// How long finished spans wait in the batch queue before being posted.
const EXPORT_DELAY: Duration = Duration::from_secs(1);

const INSTRUMENTATION_SCOPE: &str = "userd";

// ── Tracer ────────────────────────────────────────────────────────────────────

/// Cheap, cloneable handle for starting spans.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<str>,
    local_endpoint: Arc<str>,
    provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl Tracer {
    /// Batches finished spans and posts them to the Zipkin v2 HTTP API at
    /// `collector` (e.g. `http://zipkin:9411/api/v2/spans`).
    ///
    /// The exporter runs on its own thread with a blocking HTTP client, so
    /// build this before entering the async runtime.
    pub fn zipkin(service: &str, local_endpoint: &str, collector: &str) -> Result<Self, Error> {
        let mut exporter = ZipkinExporter::builder().with_collector_endpoint(collector);
        if let Some(addr) = resolve(local_endpoint) {
            exporter = exporter.with_service_address(addr);
        }
        let exporter = exporter.build().map_err(|e| Error::Trace(e.to_string()))?;

        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(BatchConfigBuilder::default().with_scheduled_delay(EXPORT_DELAY).build())
            .build();

        info!(service, collector, "exporting spans to zipkin");
        Ok(Self::build(service, local_endpoint, SdkTracerProvider::builder().with_span_processor(processor)))
    }

    /// Hands each span to `exporter` synchronously as it ends.
    pub fn with_exporter(service: &str, local_endpoint: &str, exporter: impl SpanExporter + 'static) -> Self {
        Self::build(service, local_endpoint, SdkTracerProvider::builder().with_simple_exporter(exporter))
    }

    fn build(service: &str, local_endpoint: &str, builder: TracerProviderBuilder) -> Self {
        let resource = Resource::builder()
            .with_service_name(service.to_owned())
            .with_attribute(KeyValue::new("service.address", local_endpoint.to_owned()))
            .build();
        let provider = builder.with_resource(resource).build();
        let tracer = provider.tracer(INSTRUMENTATION_SCOPE);

        Self {
            inner: Arc::new(Inner {
                service: Arc::from(service),
                local_endpoint: Arc::from(local_endpoint),
                provider,
                tracer,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Starts a span. With no parent a new trace is begun.
    pub fn start(&self, name: &str, parent: Option<&ActiveSpan>) -> ActiveSpan {
        match parent {
            Some(parent) => self.start_in(name, &parent.scope, SpanKind::Internal),
            None => self.start_in(name, &opentelemetry::Context::new(), SpanKind::Server),
        }
    }

    pub(crate) fn start_in(&self, name: &str, parent: &opentelemetry::Context, kind: SpanKind) -> ActiveSpan {
        let span = self
            .inner
            .tracer
            .span_builder(name.to_owned())
            .with_kind(kind)
            .start_with_context(&self.inner.tracer, parent);
        ActiveSpan { scope: parent.with_span(span) }
    }

    /// Exports every span that has ended so far, blocking until the
    /// collector has answered.
    pub fn force_flush(&self) -> Result<(), Error> {
        self.inner.provider.force_flush().map_err(|e| Error::Trace(e.to_string()))
    }

    /// Flushes and stops the exporter. Spans ended afterwards are dropped.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.inner.provider.shutdown().map_err(|e| Error::Trace(e.to_string()))
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("service", &self.inner.service)
            .field("local_endpoint", &self.inner.local_endpoint)
            .finish_non_exhaustive()
    }
}

/// `host:port`, resolved once at startup. Zipkin wants an IP for the local
/// endpoint; an unresolvable name leaves it out.
fn resolve(endpoint: &str) -> Option<SocketAddr> {
    endpoint.to_socket_addrs().ok()?.next()
}

// ── ActiveSpan ────────────────────────────────────────────────────────────────

/// An open span. Ended exactly once: on [`finish`](Self::finish) or drop.
#[must_use = "a span is closed as soon as it is dropped"]
pub struct ActiveSpan {
    scope: opentelemetry::Context,
}

impl ActiveSpan {
    /// A placeholder with no span behind it. Tags and ending are no-ops.
    pub fn detached() -> Self {
        Self { scope: opentelemetry::Context::new() }
    }

    pub fn context(&self) -> SpanContext {
        self.scope.span().span_context().clone()
    }

    pub fn tag(&self, key: &'static str, value: impl Into<Value>) {
        self.scope.span().set_attribute(KeyValue::new(key, value));
    }

    /// Marks the span as failed.
    pub fn fail(&self, description: impl Into<String>) {
        self.scope.span().set_status(Status::error(description.into()));
    }

    /// Closes the span now instead of at end of scope.
    pub fn finish(self) {}

    pub(crate) fn scope(&self) -> &opentelemetry::Context {
        &self.scope
    }

    /// Gives up the guard and returns the scope the span is current in. The
    /// span then ends when explicitly ended or when the last clone of the
    /// scope is dropped.
    pub(crate) fn into_scope(mut self) -> opentelemetry::Context {
        std::mem::replace(&mut self.scope, opentelemetry::Context::new())
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.scope.span().end();
    }
}

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActiveSpan").field(&self.context()).finish()
    }
}
