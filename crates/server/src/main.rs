use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trove_core::library::{AssetDownloader, FsAttachmentStore, HttpFetcher};
use trove_core::phash::PhashMatcher;
use trove_core::scanner::{ScanContext, ScannerRegistry};
use trove_core::scraper::{SqliteProfileStore, VndbProvider};
use trove_core::{
    config_path_from_env, load_config, validate_config, Adder, EventBus, ScannerService, Scrapers,
    SqliteLibrary,
};

use trove_server::api::create_router;
use trove_server::state::AppState;

/// Capacity of the library event channel
const EVENT_BUFFER_SIZE: usize = 1024;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path_from_env();
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = config_hash[..16].to_string();

    // Stores
    let library = Arc::new(
        SqliteLibrary::new(&config.database.path).context("Failed to open library database")?,
    );
    let profile_store = Arc::new(
        SqliteProfileStore::new(&config.database.path).context("Failed to open profile store")?,
    );
    info!("Library and profile store initialized");

    // Scrapers
    let scrapers = Arc::new(Scrapers::new(profile_store));

    if let Some(vndb_config) = config.providers.vndb.as_ref().filter(|c| c.enabled) {
        info!("Registering VNDB provider at {}", vndb_config.base_url);
        let provider = VndbProvider::new(vndb_config).context("Failed to create VNDB provider")?;
        scrapers
            .register(Arc::new(provider))
            .await
            .context("Failed to register VNDB provider")?;
    } else {
        info!("VNDB provider disabled");
    }

    for seed in &config.profiles {
        match scrapers.seed_profile(&seed.to_profile()) {
            Ok(true) => {}
            Ok(false) => info!(profile_id = %seed.id, "Profile already stored, keeping it"),
            Err(e) => warn!(profile_id = %seed.id, "Failed to seed profile: {}", e),
        }
    }

    // Adder with post-commit asset downloads
    let events = EventBus::new(EVENT_BUFFER_SIZE);
    let fetcher = Arc::new(HttpFetcher::new(&config.assets).context("Failed to create HTTP client")?);
    let attachments = Arc::new(
        FsAttachmentStore::new(&config.library.attachments_dir).with_fetcher(fetcher.clone()),
    );
    let adder = Arc::new(
        Adder::new(Arc::clone(&library), events.clone())
            .with_assets(AssetDownloader::new(fetcher, attachments)),
    );

    // Scanner
    let registry = Arc::new(
        ScannerRegistry::from_definitions(&config.scanners)
            .await
            .context("Invalid scanner definitions")?,
    );
    let scanner = Arc::new(ScannerService::new(
        ScanContext {
            registry,
            scrapers: Arc::clone(&scrapers),
            adder: Arc::clone(&adder),
            matcher: Arc::new(PhashMatcher::new(library)),
            events: events.clone(),
            phash: config.phash.clone(),
        },
        config.scanner.queue_capacity,
    ));
    scanner.start();
    let scheduled = scanner
        .schedule_all()
        .await
        .context("Failed to schedule scanners")?;
    info!(
        scanners = config.scanners.len(),
        scheduled, "Scan worker started"
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        config_hash_short.clone(),
        scrapers,
        adder,
        Arc::clone(&scanner),
        events,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!(config_hash = %config_hash_short, "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping scan worker...");
    scanner.stop();
    info!("Server shut down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
