//! sahayak-api - classroom SOS coaching service
//!
//! Serves the REST API under `/api/v1`. Playbooks come from Gemini when an API
//! key is configured and from the built-in fallback otherwise. `--precache`
//! warms the playbook cache and exits without serving.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sahayak_api::config::{resolve_jwt_secret, CliOverrides, ServiceConfig};
use sahayak_api::db::playbook_cache::PlaybookCache;
use sahayak_api::db::solutions;
use sahayak_api::services::precache::{precache, COMMON_SCENARIOS, DEFAULT_PAUSE};
use sahayak_api::services::KnowledgeIndex;
use sahayak_api::{build_router, AppState};
use sahayak_common::auth::TokenIssuer;
use sahayak_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver,
};
use sahayak_common::db::init_database;

/// Command-line arguments for sahayak-api
#[derive(Parser, Debug)]
#[command(name = "sahayak-api")]
#[command(about = "Classroom SOS coaching service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SAHAYAK_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Warm the playbook cache with common classroom scenarios, then exit
    #[arg(long)]
    precache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = load_toml_config(config_path.as_deref());

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting sahayak-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), toml_config.root_folder.clone()).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let config = ServiceConfig::resolve(
        &toml_config,
        &CliOverrides {
            bind: args.bind,
            port: args.port,
        },
    );

    let secret = resolve_jwt_secret(&db, &toml_config)
        .await
        .context("Failed to resolve token secret")?;
    let tokens = TokenIssuer::new(secret, config.access_token_expire_minutes)
        .context("Invalid token configuration")?;

    let model = config.build_model();

    let index = KnowledgeIndex::with_curriculum().await;
    let shared = solutions::list_indexable(&db)
        .await
        .context("Failed to load shared solutions")?;
    for s in &shared {
        index
            .add_shared_solution(
                &s.problem_description,
                &s.solution_title,
                &s.solution_description,
                &s.subject,
                s.grade,
            )
            .await;
    }
    info!("Knowledge index ready: {} documents", index.len().await);

    match PlaybookCache::new(db.clone(), config.playbook_cache_ttl_secs)
        .purge_expired()
        .await
    {
        Ok(0) => {}
        Ok(purged) => info!("Purged {} expired cache entries", purged),
        Err(e) => warn!("Cache purge failed: {}", e),
    }

    let listen_address = config.listen_address();
    let state = AppState::new(db, config, tokens, model, index);

    if args.precache {
        if !state.engine.gateway().is_available() {
            warn!("No model configured; fallback playbooks are not cached, skipping precache");
        } else if !state.cache.is_enabled() {
            warn!("Playbook cache is disabled, skipping precache");
        } else {
            info!("Precaching {} common scenarios", COMMON_SCENARIOS.len());
            let report = precache(&state.engine, COMMON_SCENARIOS, "en", DEFAULT_PAUSE).await;
            match state.cache.stats().await {
                Ok(stats) => info!(
                    "Precache finished: {} cached ({} new), {} failed; {} live cache entries",
                    report.cached(),
                    report.generated,
                    report.failed,
                    stats.entries
                ),
                Err(e) => warn!("Precache finished but cache stats failed: {}", e),
            }
        }
        return Ok(());
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("Failed to bind to {}", listen_address))?;
    info!("Listening on http://{}", listen_address);
    info!("Health check: http://{}/health", listen_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
