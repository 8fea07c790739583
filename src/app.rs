//! Composes the service: middleware order, resource routes, health checks and
//! `/metrics`.

use std::sync::Arc;

use http::Method;

use crate::health;
use crate::middleware::{CorrelationId, Metrics, RateLimit, Recover, Trace};
use crate::request::Request;
use crate::router::Router;
use crate::store::Database;
use crate::trace::Tracer;
use crate::users::{self, UserRepository, UserService};

/// Token-bucket settings shared by every client.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_second: 5.0, burst: 3 }
    }
}

/// Builds the router. The returned [`Metrics`] shares counters with the
/// layer installed in the router.
///
/// Layers, outermost first: metrics, trace, rate limit, correlation id,
/// recover.
pub fn build(db: Database, tracer: Tracer, limits: RateLimitConfig) -> (Router, Metrics) {
    let metrics = Metrics::new();
    let service = Arc::new(UserService::new(UserRepository::new(&db)));
    let exposition = metrics.clone();

    let router = Router::new()
        .layer(metrics.clone())
        .layer(Trace::new(tracer))
        .layer(RateLimit::new(limits.per_second, limits.burst))
        .layer(CorrelationId)
        .layer(Recover)
        .on(Method::GET, "/metrics", "metrics", move |_req: Request| {
            let res = exposition.respond();
            async move { res }
        })
        .on(Method::GET, "/healthz", "health.liveness", health::liveness)
        .on(Method::GET, "/readyz", "health.readiness", move |req| health::readiness(db.clone(), req));

    (users::routes(router, service), metrics)
}
