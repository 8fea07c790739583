//! Request metrics and their Prometheus rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use http::StatusCode;
use parking_lot::Mutex;

use crate::context::Context;
use crate::middleware::{Fault, Middleware};
use crate::response::Response;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Passive observer: counts every response by route and status, sums
/// latency, and counts recovered faults. Never short-circuits.
///
/// The exposition also carries the standard `process_*` gauges and the
/// tokio runtime's worker and task counts.
///
/// Cloning shares the counters, so one clone goes into the middleware list and
/// another backs the `/metrics` route.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    requests: Mutex<BTreeMap<(&'static str, u16), u64>>,
    latency_ns: AtomicU64,
    observed: AtomicU64,
    faults: AtomicU64,
    started: f64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            requests: Mutex::default(),
            latency_ns: AtomicU64::new(0),
            observed: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            started: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |d| d.as_secs_f64()),
        }
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

/// `process_*` gauges in the names Prometheus client libraries use.
fn render_process(out: &mut String, started: f64) {
    gauge(out, "process_start_time_seconds", "Start time of the process since unix epoch in seconds.", started);

    if let Some(usage) = memory_stats::memory_stats() {
        gauge(out, "process_resident_memory_bytes", "Resident memory size in bytes.", usage.physical_mem);
        gauge(out, "process_virtual_memory_bytes", "Virtual memory size in bytes.", usage.virtual_mem);
    }

    #[cfg(target_os = "linux")]
    if let Ok(fds) = std::fs::read_dir("/proc/self/fd") {
        gauge(out, "process_open_fds", "Number of open file descriptors.", fds.count());
    }
}

/// Worker and task counts of the runtime serving the scrape, if any.
fn render_runtime(out: &mut String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else { return };
    let runtime = handle.metrics();
    gauge(out, "tokio_workers", "Worker threads in the async runtime.", runtime.num_workers());
    gauge(out, "tokio_alive_tasks", "Tasks currently alive in the async runtime.", runtime.num_alive_tasks());
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses seen for `route` with `status`.
    pub fn requests(&self, route: &str, status: StatusCode) -> u64 {
        let requests = self.inner.requests.lock();
        requests
            .iter()
            .find(|((r, s), _)| *r == route && *s == status.as_u16())
            .map_or(0, |(_, n)| *n)
    }

    pub fn faults(&self) -> u64 {
        self.inner.faults.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP userd_requests_total Total number of handled requests\n");
        out.push_str("# TYPE userd_requests_total counter\n");
        for ((route, status), count) in self.inner.requests.lock().iter() {
            let _ = writeln!(
                out,
                "userd_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}"
            );
        }

        let sum = self.inner.latency_ns.load(Ordering::Relaxed) as f64 / 1e9;
        let count = self.inner.observed.load(Ordering::Relaxed);
        out.push_str("# HELP userd_request_duration_seconds Time spent handling requests\n");
        out.push_str("# TYPE userd_request_duration_seconds summary\n");
        let _ = writeln!(out, "userd_request_duration_seconds_sum {sum}");
        let _ = writeln!(out, "userd_request_duration_seconds_count {count}");

        out.push_str("# HELP userd_faults_total Panics recovered by the middleware chain\n");
        out.push_str("# TYPE userd_faults_total counter\n");
        let _ = writeln!(out, "userd_faults_total {}", self.faults());

        render_process(&mut out, self.inner.started);
        render_runtime(&mut out);
        out
    }

    /// `GET /metrics`.
    pub fn respond(&self) -> Response {
        Response::typed(StatusCode::OK, EXPOSITION_CONTENT_TYPE, self.render())
    }
}

impl Middleware for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn after(&self, ctx: &mut Context, res: &mut Response) {
        let elapsed = u64::try_from(ctx.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.inner.latency_ns.fetch_add(elapsed, Ordering::Relaxed);
        self.inner.observed.fetch_add(1, Ordering::Relaxed);
        *self
            .inner
            .requests
            .lock()
            .entry((ctx.route(), res.status_code().as_u16()))
            .or_default() += 1;
    }

    fn on_fault(&self, _ctx: &Context, _fault: &Fault) -> Option<Response> {
        self.inner.faults.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_route_and_status() {
        let metrics = Metrics::new();
        let mut ctx = Context::new("users.get");

        metrics.after(&mut ctx, &mut Response::status(StatusCode::OK));
        metrics.after(&mut ctx, &mut Response::status(StatusCode::OK));
        metrics.after(&mut ctx, &mut Response::status(StatusCode::NOT_FOUND));

        assert_eq!(metrics.requests("users.get", StatusCode::OK), 2);
        assert_eq!(metrics.requests("users.get", StatusCode::NOT_FOUND), 1);
        assert_eq!(metrics.requests("users.list", StatusCode::OK), 0);
    }

    #[test]
    fn render_is_prometheus_text() {
        let metrics = Metrics::new();
        let mut ctx = Context::new("users.list");
        metrics.after(&mut ctx, &mut Response::status(StatusCode::OK));
        metrics.on_fault(&ctx, &Fault::new("boom"));

        let text = metrics.render();
        assert!(text.contains("# TYPE userd_requests_total counter"));
        assert!(text.contains("userd_requests_total{route=\"users.list\",status=\"200\"} 1"));
        assert!(text.contains("userd_request_duration_seconds_count 1"));
        assert!(text.contains("userd_faults_total 1"));
    }

    #[test]
    fn render_includes_process_gauges() {
        let text = Metrics::new().render();
        assert!(text.contains("# TYPE process_start_time_seconds gauge"), "{text}");
        assert!(!text.contains("tokio_workers"), "no runtime outside tokio: {text}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn render_includes_runtime_gauges_inside_tokio() {
        let text = Metrics::new().render();
        assert!(text.contains("tokio_workers 2"), "{text}");
        assert!(text.contains("# TYPE tokio_alive_tasks gauge"), "{text}");
    }

    #[test]
    fn clones_share_counters() {
        let metrics = Metrics::new();
        let observer = metrics.clone();
        observer.on_fault(&Context::new("users.get"), &Fault::new("boom"));
        assert_eq!(metrics.faults(), 1);
    }
}
