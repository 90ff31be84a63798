mod api;
mod config;
pub mod cursor;
pub mod fetch;
pub mod filters;
pub mod killmail;
pub mod models;
pub mod poller;
pub mod repository;
pub mod shutdown;

use {
    config::Config,
    cursor::CursorStore,
    fetch::ZkbClient,
    filters::{
        level1::{NpcFilter, SecurityFilter},
        level2::MinValueFilter,
        FilterPipeline,
    },
    poller::{Poller, RepositorySink},
    repository::KillmailRepository,
    shutdown::Shutdown,
    std::sync::Arc,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::from_env();

    // Write logs to stderr so they survive redirection of API output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("🚀 Starting killfeed...");
    log::info!("📊 Configuration:");
    log::info!("   Base URL: {}", config.base_url);
    log::info!("   Database: {}", config.db_path);
    log::info!("   API address: {}", config.api_addr);
    log::info!(
        "   Poller: {}",
        if config.poller_enabled { "enabled" } else { "disabled" }
    );

    let repository = Arc::new(KillmailRepository::open(&config.db_path)?);

    let shutdown = Shutdown::new();

    // Poller runs as a background task; a fatal poller error stops ingestion
    // but leaves the read API serving.
    let mut poller_handle = None;
    if config.poller_enabled {
        let pipeline = build_pipeline(&config);
        let client = ZkbClient::new(&config.base_url, shutdown.clone())?;
        let cursor = CursorStore::new(&config.state_file);
        let sink = RepositorySink::new(repository.clone());
        let poller = Poller::new(client, pipeline, cursor, shutdown.clone());
        let start_from = config.start_from;

        poller_handle = Some(tokio::spawn(async move {
            if let Err(e) = poller.poll(&sink, start_from).await {
                log::error!("❌ Poller stopped with fatal error: {}", e);
            }
        }));
        log::info!("✅ Poller task spawned");
    }

    // CTRL+C triggers the shared shutdown token; the poller and the API
    // server both watch it.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("⚠️  Received CTRL+C, shutting down..."),
            Err(e) => log::error!("❌ Failed to listen for CTRL+C: {}", e),
        }
        signal_shutdown.trigger();
    });

    let app = api::create_router(repository);
    let listener = tokio::net::TcpListener::bind(&config.api_addr).await?;
    log::info!("📡 Read API listening on {}", config.api_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    if let Some(handle) = poller_handle {
        // The poller saves its cursor inside the running iteration, so this
        // join is bounded by one wait interval.
        let _ = handle.await;
    }

    log::info!("✅ killfeed stopped");
    Ok(())
}

/// Build the filter pipeline from configuration.
///
/// Level 1: NPC exclusion and security-zone allow list.
/// Level 2: minimum value threshold.
fn build_pipeline(config: &Config) -> FilterPipeline {
    let mut pipeline = FilterPipeline::new();
    if config.exclude_npc {
        pipeline.add_level1(NpcFilter::new(true));
    }
    if !config.security_zones.is_empty() {
        pipeline.add_level1(SecurityFilter::new(&config.security_zones));
    }
    if config.min_value > 0.0 {
        pipeline.add_level2(MinValueFilter::new(config.min_value));
    }
    pipeline
}
