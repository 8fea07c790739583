//! Route handlers.
//!
//! Every route stores its handler as an [`Arc<dyn Handler>`](SharedHandler)
//! so handlers of different types share one routing table:
//!
//! ```text
//! move |req| users::handlers::get(Arc::clone(&svc), req)
//!        ↓ router.on(Method::GET, "/users/{id}", "users.get", …)
//! Arc::new(closure) as SharedHandler
//!        ↓ at request time
//! tokio::spawn(handler.call(req))   ← panics surface as a JoinError
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Boxed response future. `Send + 'static` so the chain can spawn it.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Something a route can dispatch to.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = impl IntoResponse>`,
/// which covers plain `async fn`s and closures capturing a service handle.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = self(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

pub(crate) type SharedHandler = Arc<dyn Handler>;

pub(crate) fn shared(handler: impl Handler) -> SharedHandler {
    Arc::new(handler)
}
