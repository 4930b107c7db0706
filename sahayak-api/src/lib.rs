//! sahayak-api library interface
//!
//! Exposes the router and application state for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use sahayak_common::auth::TokenIssuer;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServiceConfig;
use crate::db::playbook_cache::PlaybookCache;
use crate::services::{AiGateway, KnowledgeIndex, PedagogyEngine, PlaybookModel};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    pub tokens: TokenIssuer,
    pub engine: PedagogyEngine,
    pub cache: PlaybookCache,
    pub index: KnowledgeIndex,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// `model` is `None` in fallback mode
    pub fn new(
        db: SqlitePool,
        config: ServiceConfig,
        tokens: TokenIssuer,
        model: Option<Arc<dyn PlaybookModel>>,
        index: KnowledgeIndex,
    ) -> Self {
        let cache = PlaybookCache::new(db.clone(), config.playbook_cache_ttl_secs);
        let engine = PedagogyEngine::new(db.clone(), AiGateway::new(model), cache.clone(), index.clone());
        Self {
            db,
            config: Arc::new(config),
            tokens,
            engine,
            cache,
            index,
            startup_time: Utc::now(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build application router
///
/// Versioned endpoints live under `/api/v1`; service info and health sit at
/// the root.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::users::profile_routes())
        .merge(api::sos::sos_routes())
        .merge(api::dashboard::dashboard_routes())
        .merge(api::knowledge::member_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    let optional = Router::new()
        .merge(api::sos::quick_routes())
        .merge(api::knowledge::library_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::optional_auth_middleware,
        ));

    let public = Router::new()
        .merge(api::users::auth_routes())
        .merge(api::dashboard::overview_routes())
        .merge(api::knowledge::public_routes());

    Router::new()
        .merge(api::health_routes())
        .nest("/api/v1", public.merge(optional).merge(protected))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
