//! Unified startup error type.

use crate::store::StoreError;

/// The error type returned by userd's fallible startup operations.
///
/// Request-level failures (400, 404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: connecting to the store, building the span
/// exporter, binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("trace exporter: {0}")]
    Trace(String),
}
