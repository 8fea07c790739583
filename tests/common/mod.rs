#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData};
use serde_json::{Value, json};

use userd::Router;
use userd::app::{self, RateLimitConfig};
use userd::middleware::Metrics;
use userd::store::{
    Database, DeleteResult, Document, DocumentStore, Filter, InsertOneResult, MemoryStore,
    StoreError, Update, UpdateResult,
};
use userd::trace::Tracer;

pub const UNLIMITED: RateLimitConfig = RateLimitConfig { per_second: 100_000.0, burst: 100_000 };

/// Keeps ended spans for inspection.
#[derive(Clone, Default)]
pub struct Spans(InMemorySpanExporter);

impl Spans {
    pub fn all(&self) -> Vec<SpanData> {
        self.0.get_finished_spans().unwrap()
    }
}

/// [`MemoryStore`] that counts inserts.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub inserts: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn find(&self, namespace: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.inner.find(namespace, filter).await
    }

    async fn find_one(&self, namespace: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(namespace, filter).await
    }

    async fn insert_one(&self, namespace: &str, doc: Document) -> Result<InsertOneResult, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_one(namespace, doc).await
    }

    async fn update_one(
        &self,
        namespace: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        self.inner.update_one(namespace, filter, update).await
    }

    async fn delete_one(&self, namespace: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.inner.delete_one(namespace, filter).await
    }
}

/// How a [`FaultyStore`] misbehaves.
#[derive(Clone, Copy)]
pub enum Fault {
    /// Every read and write fails; pings still answer.
    Down,
    /// Inserts succeed but report an id that is not an ObjectId.
    PlainInsertedId,
}

/// [`MemoryStore`] with an injected failure.
pub struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self { inner: MemoryStore::new(), fault }
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.fault {
            Fault::Down => Err(StoreError::Unavailable("connection reset".into())),
            Fault::PlainInsertedId => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find(&self, namespace: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        self.inner.find(namespace, filter).await
    }

    async fn find_one(&self, namespace: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        self.check()?;
        self.inner.find_one(namespace, filter).await
    }

    async fn insert_one(&self, namespace: &str, doc: Document) -> Result<InsertOneResult, StoreError> {
        self.check()?;
        self.inner.insert_one(namespace, doc).await?;
        Ok(InsertOneResult { inserted_id: json!("plain") })
    }

    async fn update_one(
        &self,
        namespace: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        self.check()?;
        self.inner.update_one(namespace, filter, update).await
    }

    async fn delete_one(&self, namespace: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.check()?;
        self.inner.delete_one(namespace, filter).await
    }
}

pub struct App {
    pub router: Router,
    pub metrics: Metrics,
    pub spans: Spans,
}

pub fn app(limits: RateLimitConfig) -> App {
    app_with_store(Arc::new(MemoryStore::new()), limits)
}

pub fn app_with_store(store: Arc<dyn DocumentStore>, limits: RateLimitConfig) -> App {
    let spans = Spans::default();
    let tracer = Tracer::with_exporter("userd-test", "localhost:8080", spans.0.clone());
    let (router, metrics) = app::build(Database::new(store, "myapp"), tracer, limits);
    App { router, metrics, spans }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn correlation_id(&self) -> &str {
        self.headers
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub async fn send(router: &Router, method: Method, uri: &str, body: impl Into<Bytes>) -> Reply {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    collect(router.handle(req).await).await
}

pub async fn collect(res: http::Response<Full<Bytes>>) -> Reply {
    let (parts, body) = res.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

/// POSTs a user and returns its generated id.
pub async fn create_user(router: &Router, name: &str, email: &str) -> String {
    let body = json!({"name": name, "email": email}).to_string();
    let reply = send(router, Method::POST, "/users", body).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json()["output"]["id"].as_str().unwrap().to_owned()
}
