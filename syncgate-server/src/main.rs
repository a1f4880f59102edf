use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use syncgate::{MemoryStore, RateLimiter};
use syncgate_server::config::Config;
use syncgate_server::metrics::Metrics;
use syncgate_server::middleware::GateState;
use syncgate_server::routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("syncgate={}", config.log_level).parse()?)
                .add_directive(format!("syncgate_server={}", config.log_level).parse()?),
        )
        .init();

    // Construct the limiter once; every handler shares this instance
    let store = MemoryStore::builder()
        .capacity(config.store.capacity)
        .cleanup_interval(Duration::from_secs(config.store.cleanup_interval))
        .build();
    let limiter = Arc::new(
        RateLimiter::builder(store, config.quotas.clone())
            .failure_policy(config.failure_policy)
            .store_timeout(config.store_timeout)
            .ttl_grace(config.ttl_grace)
            .build(),
    );
    let metrics = Arc::new(Metrics::new());

    let app = routes::router(GateState::new(limiter, metrics));

    let addr = format!("{}:{}", config.listen.host, config.listen.port);
    tracing::info!(
        addr = %addr,
        policy = config.failure_policy.as_str(),
        store_capacity = config.store.capacity,
        "syncgate admission service starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
