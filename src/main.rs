//! Draft sync daemon
//!
//! Keeps the local offline store healthy and drains queued writes to the
//! observation API whenever the server is reachable.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use draft_sync::network::spawn_health_probe;
use draft_sync::{db, Config, HttpRemote, HybridStorage, NetworkMonitor, RemoteApi, SyncContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting draft sync daemon");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("API base: {}", config.api_base);
    tracing::info!("Sync interval: {:?}", config.sync_interval);

    if config.api_key.is_none() {
        tracing::warn!("No API key configured (DRAFT_SYNC_API_KEY). Requests are unauthenticated!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(
        config.api_base.clone(),
        config.api_key.clone(),
    ));

    // Assume offline until the first probe answers
    let monitor = Arc::new(NetworkMonitor::new(false));

    let ctx = SyncContext::new(pool, remote.clone(), monitor.clone()).with_cache_ttl(config.cache_ttl);
    let storage = HybridStorage::new(ctx);

    // Probe only once the coordinator listens for the first transition
    let probe = spawn_health_probe(monitor, remote, config.probe_interval);

    let swept = storage.clear_old_drafts(config.draft_retention).await;
    tracing::info!("Retention sweep removed {} drafts", swept);
    tracing::info!("{} actions waiting to sync", storage.pending_count().await);

    storage.start_auto_sync(config.sync_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    storage.stop_auto_sync();
    probe.abort();

    Ok(())
}
