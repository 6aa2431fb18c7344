mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{CounterStore, FormatConfigSource};
use crate::generator::Clock;

pub use handlers::{
    AppState, ComponentHealth, CountersResponse, ErrorResponse, FamiliesResponse, NextRequest,
    PreviewQuery, ReadinessResponse, RenderRequest, StatsResponse,
};

/// Creates the API router.
pub fn create_router<S, C, K>(state: Arc<AppState<S, C, K>>) -> Router
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready::<S, C, K>))
        .route("/stats", get(handlers::get_stats::<S, C, K>))
        .route("/metrics", get(handlers::metrics::<S, C, K>))
        .route("/families", get(handlers::list_families::<S, C, K>))
        .route(
            "/families/:family/next",
            post(handlers::next_identifier::<S, C, K>),
        )
        .route(
            "/families/:family/preview",
            get(handlers::preview_identifier::<S, C, K>),
        )
        .route(
            "/families/:family/render",
            post(handlers::render_reserved::<S, C, K>),
        )
        // Format configuration admin
        .route(
            "/families/:family/config",
            get(handlers::get_config::<S, C, K>).put(handlers::put_config::<S, C, K>),
        )
        .route("/counters", get(handlers::list_counters::<S, C, K>))
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `MEDSEQ_HOST` and `MEDSEQ_PORT`, falling back to defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("MEDSEQ_HOST").unwrap_or(default.host),
            port: std::env::var("MEDSEQ_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, C, K, F>(
    config: ServerConfig,
    state: Arc<AppState<S, C, K>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
