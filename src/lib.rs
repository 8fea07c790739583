//! # userd
//!
//! A small HTTP service exposing CRUD on a `User` resource kept in a document
//! store.
//!
//! ```text
//! hyper ─▶ Server ─▶ Router ─▶ metrics ─▶ trace ─▶ rate_limit ─▶ correlation_id ─▶ recover ─▶ handler
//!                                                                                            │
//!                                                          UserService ─▶ UserRepository ◀───┘
//!                                                                               │
//!                                                                         DocumentStore
//! ```
//!
//! - Radix-tree routing via [`matchit`], one logical operation name per route
//! - Middleware as an ordered list with `before`/`after`/`on_fault` hooks
//! - Every response wrapped in the `{"output", "errorMessages"}` envelope
//! - A request-scoped [`Context`] carries the correlation id and current span
//!   from handler to service to repository
//! - Spans exported to Zipkin through OpenTelemetry
//! - MongoDB or in-process document store behind one trait
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use userd::app::{self, RateLimitConfig};
//! use userd::trace::Tracer;
//! use userd::{Server, store};
//!
//! fn main() -> Result<(), userd::Error> {
//!     let tracer = Tracer::zipkin("userd", "localhost:8080", "http://zipkin:9411/api/v2/spans")?;
//!     let runtime = tokio::runtime::Runtime::new()?;
//!
//!     runtime.block_on(async {
//!         let db = store::connect("mongodb://localhost:27017", "myapp", Duration::from_secs(10)).await?;
//!         let (router, _metrics) = app::build(db, tracer.clone(), RateLimitConfig::default());
//!         Server::bind("0.0.0.0:8080".parse().unwrap()).serve(router).await
//!     })?;
//!     tracer.shutdown()
//! }
//! ```

mod context;
mod envelope;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod config;
pub mod health;
pub mod middleware;
pub mod store;
pub mod telemetry;
pub mod trace;
pub mod users;

pub use context::Context;
pub use envelope::{Envelope, respond_error, respond_json};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use router::{NOT_FOUND_ROUTE, Router};
pub use server::Server;
