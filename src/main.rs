//! Shelfsync Engine
//!
//! Keeps one user's media collection in sync across devices, caches content
//! provider lookups and serves suggestions drawn from the collection.
//!
//! # Architecture
//!
//! - **Collection store**: PostgreSQL (with change push) or in-memory
//! - **Sync coordinator**: single-flight refresh driven by three signals
//! - **Content service**: cache, providers, bundled catalog fallback
//! - **API Server**: REST endpoints for clients
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Sync listeners are detached
//! - Database connections are closed cleanly

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelfsync::api::{self, AppState};
use shelfsync::cache::{ContentCache, KeyValueStore, SqliteKv};
use shelfsync::clock::SystemClock;
use shelfsync::config::{Config, ProviderConfig};
use shelfsync::content::{HttpCatalogProvider, ProviderRegistry};
use shelfsync::database::{self, Database};
use shelfsync::error::Result;
use shelfsync::models::Domain;
use shelfsync::session::{CollectionSession, SessionParts};
use shelfsync::store::{DurableStore, MemoryStore, PgCollectionStore};

/// Startup connection attempts before giving up on PostgreSQL
const DB_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 Shelfsync Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Config::from_env()?;
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    if let Some(addr) = &config.metrics_addr {
        install_metrics_exporter(addr);
    }

    // Durable collection store
    let (store, db): (Arc<dyn DurableStore>, Option<Database>) = match &config.database {
        Some(db_config) => {
            let db = database::with_retry(
                || Database::new(db_config),
                DB_CONNECT_RETRIES,
                Duration::from_secs(1),
            )
            .await?;
            info!("✅ Database connection pool established");

            database::run_migrations(db.pool()).await?;
            info!("✅ Database migrations applied");

            let store = PgCollectionStore::new(db.pool().clone(), db_config.notify_channel.clone());
            (Arc::new(store), Some(db))
        }
        None => {
            warn!("⚠️ DATABASE_URL not set, collection lives in memory only");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    // Local key-value area behind the content cache
    let kv = SqliteKv::open(&config.local_store.path).await?;
    let clock = Arc::new(SystemClock);
    let cache = ContentCache::new(
        Arc::new(kv.clone()) as Arc<dyn KeyValueStore>,
        &config.cache,
        clock.clone(),
    );

    let registry = build_registry(&config.providers)?;
    for (domain, providers) in registry.summary() {
        info!("  {} providers: {:?}", domain, providers);
    }

    let session = Arc::new(
        CollectionSession::start(
            &config,
            SessionParts {
                store,
                cache,
                registry,
                clock,
            },
        )
        .await,
    );

    info!("═══════════════════════════════════════════════════════════════");
    info!("  ✅ All services started successfully");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    let state = AppState {
        session: session.clone(),
    };
    if let Err(e) = api::start_server(state, &config.api, shutdown_signal()).await {
        error!("API server error: {:?}", e);
    }

    // Graceful shutdown
    info!("🛑 Initiating graceful shutdown...");

    match Arc::try_unwrap(session) {
        Ok(session) => {
            let stats = session.teardown().await;
            info!(
                "Sync stopped after {} fetches ({} applied, {} discarded)",
                stats.fetches_started, stats.fetches_applied, stats.fetches_discarded
            );
        }
        Err(_) => warn!("⚠️ Session still shared at shutdown, dropping it detaches sync"),
    }

    kv.close().await;
    if let Some(db) = db {
        db.close().await;
    }

    info!("👋 Shelfsync Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("shelfsync_engine=debug,shelfsync=debug,tower_http=debug,sqlx=warn,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

/// One HTTP provider per configured URL and domain
fn build_registry(config: &ProviderConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for domain in Domain::ALL {
        if let Some(url) = &config.primary_url {
            registry.register_primary(Arc::new(HttpCatalogProvider::new(
                format!("primary-{}", domain),
                url.as_str(),
                domain,
                config.request_timeout,
            )?));
        }
        if let Some(url) = &config.secondary_url {
            registry.register_secondary(Arc::new(HttpCatalogProvider::new(
                format!("secondary-{}", domain),
                url.as_str(),
                domain,
                config.request_timeout,
            )?));
        }
    }
    Ok(registry)
}

#[cfg(feature = "prometheus")]
fn install_metrics_exporter(addr: &str) {
    match addr.parse::<std::net::SocketAddr>() {
        Ok(socket) => {
            match metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(socket)
                .install()
            {
                Ok(()) => info!("📊 Prometheus metrics on http://{}/metrics", socket),
                Err(e) => error!("Failed to install metrics exporter: {}", e),
            }
        }
        Err(e) => error!("Invalid METRICS_ADDR {}: {}", addr, e),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("📴 Shutdown signal received");
}
