//! Radix-tree request router with an ordered middleware list.
//!
//! One tree per HTTP method. O(path-length) lookup. Each route carries a
//! logical operation name (`users.get`) that becomes the root span name and
//! the metrics label.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;

use crate::context::Context;
use crate::envelope::respond_error;
use crate::handler::{Handler, SharedHandler, shared};
use crate::middleware::{Chain, Middleware};
use crate::request::Request;

/// Route name used for requests that match no route.
pub const NOT_FOUND_ROUTE: &str = "not_found";

#[derive(Clone)]
struct Route {
    name: &'static str,
    handler: SharedHandler,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// [`layer`](Router::layer) and [`on`](Router::on) return `self` so
/// registrations chain naturally. Layers run in registration order, outermost
/// first.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    chain: Chain,
    fallback: SharedHandler,
    unreadable: SharedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            chain: Chain::default(),
            fallback: shared(not_found),
            unreadable: shared(unreadable_body),
        }
    }

    /// Appends a middleware layer inside every layer added before it.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Register a handler for a method + path pair under an operation name.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an existing route. Both
    /// are programming errors caught the first time the router is built.
    pub fn on(mut self, method: Method, path: &str, name: &'static str, handler: impl Handler) -> Self {
        let route = Route { name, handler: shared(handler) };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Names of the registered layers, outermost first.
    pub fn layers(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Route, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }

    fn resolve(&self, method: &Method, path: &str) -> (Route, HashMap<String, String>) {
        self.lookup(method, path).unwrap_or_else(|| {
            let fallback = Route { name: NOT_FOUND_ROUTE, handler: Arc::clone(&self.fallback) };
            (fallback, HashMap::new())
        })
    }

    /// Routes one request through the middleware chain and its handler.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let (route, params) = self.resolve(req.method(), req.uri().path());
        let request = Request::new(req, params, Context::new(route.name));
        self.chain.run(request, route.handler).await.into_inner()
    }

    /// Answers a request whose body could not be read. It still passes
    /// through every layer under the route it matched; only the handler is
    /// replaced by a 400 envelope.
    pub async fn reject_unreadable(&self, parts: http::request::Parts) -> http::Response<Full<Bytes>> {
        let (route, params) = self.resolve(&parts.method, parts.uri.path());
        let request = Request::new(http::Request::from_parts(parts, Bytes::new()), params, Context::new(route.name));
        self.chain.run(request, Arc::clone(&self.unreadable)).await.into_inner()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> crate::Response {
    respond_error(StatusCode::NOT_FOUND, "Route not found")
}

async fn unreadable_body(_req: Request) -> crate::Response {
    respond_error(StatusCode::BAD_REQUEST, "Invalid request payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;

    async fn echo_id(req: Request) -> Response {
        Response::text(req.param("id").unwrap_or_default().to_owned())
    }

    fn get(uri: &str) -> http::Request<Bytes> {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_by_method_and_path_with_params() {
        let router = Router::new().on(Method::GET, "/users/{id}", "users.get", echo_id);

        let res = router.handle(get("/users/42")).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = http_body_util::BodyExt::collect(res.into_body()).await.unwrap().to_bytes();
        assert_eq!(&body[..], b"42");
    }

    #[tokio::test]
    async fn unmatched_method_or_path_is_a_404_envelope() {
        let router = Router::new().on(Method::GET, "/users/{id}", "users.get", echo_id);

        let post = http::Request::builder()
            .method(Method::POST)
            .uri("/users/42")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(router.handle(post).await.status(), StatusCode::NOT_FOUND);

        let res = router.handle(get("/nope")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["content-type"], "application/json");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics_at_build_time() {
        let _ = Router::new()
            .on(Method::GET, "/users/{id}", "users.get", echo_id)
            .on(Method::GET, "/users/{name}", "users.by_name", echo_id);
    }
}
