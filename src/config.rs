//! Process configuration, from flags or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(name = "userd", version, about = "User CRUD service")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Document store connection string. Supported schemes: `mongodb://`,
    /// `mongodb+srv://` and `memory://`.
    #[arg(long, env = "STORE_URI", default_value = "memory://localhost")]
    pub store_uri: String,

    #[arg(long, env = "STORE_DATABASE", default_value = "myapp")]
    pub store_database: String,

    /// Seconds to wait for the store to answer its first ping.
    #[arg(long, env = "STORE_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub store_connect_timeout_secs: u64,

    /// Service name reported on every span.
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Zipkin collector finished spans are posted to, e.g.
    /// `http://zipkin:9411/api/v2/spans`.
    #[arg(long, env = "TRACE_ENDPOINT")]
    pub trace_endpoint: String,

    /// `host:port` this instance is reachable at, recorded on spans.
    #[arg(long, env = "SERVICE_IP", default_value = "localhost:8080")]
    pub service_ip: String,

    /// Sustained requests per second admitted across all clients.
    #[arg(long, env = "RATE_LIMIT_RPS", default_value_t = 5.0)]
    pub rate_limit_rps: f64,

    /// Requests admitted at one instant on a full bucket.
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 3)]
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.store_connect_timeout_secs)
    }
}
