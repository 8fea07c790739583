use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use userd::app::{self, RateLimitConfig};
use userd::config::Config;
use userd::trace::Tracer;
use userd::{Server, store, telemetry};

fn main() -> ExitCode {
    let config = Config::parse();
    telemetry::init_logging();

    // The span exporter owns a blocking HTTP client and its own thread; it is
    // built and shut down outside the runtime.
    let tracer = match Tracer::zipkin(&config.service_name, &config.service_ip, &config.trace_endpoint) {
        Ok(tracer) => tracer,
        Err(e) => {
            error!(endpoint = %config.trace_endpoint, "failed to set up tracing: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run(config, tracer.clone()));
    drop(runtime);

    if let Err(e) = tracer.shutdown() {
        warn!("failed to flush spans: {e}");
    }
    code
}

async fn run(config: Config, tracer: Tracer) -> ExitCode {
    let db = match store::connect(&config.store_uri, &config.store_database, config.connect_timeout()).await {
        Ok(db) => db,
        Err(e) => {
            error!(database = %config.store_database, "failed to connect to document store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let limits = RateLimitConfig {
        per_second: config.rate_limit_rps,
        burst: config.rate_limit_burst,
    };
    let (router, _metrics) = app::build(db, tracer, limits);

    match Server::bind(config.listen_addr).serve(router).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
