use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use barrage::{
    DispatchConfig, Dispatcher, ExtractionManager, LocalObjectStore, ReqwestHttpClient, server,
};

/// Plan date-batched extraction jobs and fan them out to a worker.
#[derive(Debug, Parser)]
#[command(name = "barrage", version, about)]
struct Args {
    /// Address the trigger endpoint listens on
    #[arg(long, env = "BARRAGE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Worker endpoint every job is posted to
    #[arg(long, env = "WORKER_URL")]
    worker_url: String,

    /// Directory holding one subdirectory per bucket
    #[arg(long, env = "BARRAGE_STORE_ROOT", default_value = ".")]
    store_root: PathBuf,

    #[arg(long, env = "BARRAGE_MAX_CONNECTIONS", default_value_t = 8)]
    max_connections: usize,

    #[arg(long, env = "BARRAGE_RATE_LIMIT_REQUESTS", default_value_t = 600)]
    rate_limit_requests: u32,

    #[arg(long, env = "BARRAGE_RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    rate_limit_window_ms: u64,

    #[arg(long, env = "BARRAGE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "BARRAGE_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    #[arg(long, env = "BARRAGE_CONNECT_TIMEOUT_MS", default_value_t = 300_000)]
    connect_timeout_ms: u64,
}

impl Args {
    fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            worker_url: self.worker_url.clone(),
            max_connections: self.max_connections,
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_window_ms: self.rate_limit_window_ms,
            max_attempts: self.max_attempts,
            retry_delay_ms: self.retry_delay_ms,
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "barrage=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.dispatch_config();

    let http_client = ReqwestHttpClient::new(Duration::from_millis(config.connect_timeout_ms))?;
    let dispatcher = Dispatcher::new(http_client, config)?;
    let store = LocalObjectStore::new(&args.store_root);
    let manager = ExtractionManager::new(Arc::new(store), Arc::new(dispatcher));

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(
        bind = %args.bind,
        worker_url = %args.worker_url,
        store_root = %args.store_root.display(),
        "Extraction manager listening"
    );

    axum::serve(listener, server::router(Arc::new(manager))).await?;
    Ok(())
}
