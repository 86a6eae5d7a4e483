//! API routes

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use phishsim_common::config::ApiConfig;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, health, stats, tracking};
use crate::openapi::create_openapi_routes;

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::ACCEPT,
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-api-key"),
            ]),
    )
}

/// Create the HTTP router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Public tracking routes, keyed by recipient token
    let tracking_routes = Router::new()
        .route("/open/:token", get(tracking::track_open))
        .route("/t/:token", get(tracking::track_click))
        .route("/landing/:token", get(tracking::landing_page))
        .route("/submit", post(tracking::track_submit))
        .with_state(state.clone());

    // Metrics require an operator key
    let metrics_routes = Router::new()
        .route("/metrics", get(health::metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns).post(campaigns::create_campaign))
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id/targets", post(campaigns::add_targets))
        .route("/:id/send", post(campaigns::send_campaign))
        .route("/:id/dispatch", get(campaigns::dispatch_progress))
        .route("/:id/export", get(campaigns::export_results))
        .route("/:id/stats", get(campaigns::get_campaign_stats));

    // Operator API with authentication
    let api = Router::new()
        .nest("/campaigns", campaign_routes)
        .route("/stats", get(stats::get_overall_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    let mut router = Router::new()
        .nest("/health", health_routes)
        .nest("/api", api)
        .merge(tracking_routes)
        .merge(metrics_routes);

    if config.enable_docs {
        router = router.merge(create_openapi_routes());
    }

    if let Some(cors) = cors_layer(&config.cors_origins) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http())
}
