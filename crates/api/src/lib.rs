//! HTTP glue around the runtime core.
//!
//! Applications register their own command and query routes; this crate
//! provides the pieces every deployment needs: the observed-position header
//! transport, the status/introspection surface, the Prometheus endpoint and
//! the mapping from core errors to HTTP responses.

pub mod config;
pub mod error;
pub mod gateway;
pub mod observed;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use event_store::EventStore;
use projections::UpdatableProjection;

pub use config::Config;
pub use error::ApiError;
pub use gateway::DispatchingGateway;

/// Shared state of the built-in routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub projections: Vec<Arc<dyn UpdatableProjection>>,
}

/// Builds a router with the built-in operational routes. Application routes
/// live in their own router, layered with [`observed::observed_position`]
/// where they need the request scope.
pub fn router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/status", get(routes::status::get))
        .with_state(Arc::new(state))
        .merge(metrics_router)
        .layer(axum::middleware::from_fn(observed::observed_position))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Initializes the tracing subscriber from the configured filter directive.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
