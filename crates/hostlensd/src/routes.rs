//! Route configuration for the daemon API.

use std::sync::Arc;

use axum::routing::{get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::DaemonConfig;
use crate::handlers::{
    about, ai_anomaly, ai_clusters, ai_forecast, dashboard, healthz, metrics, report_html,
    report_img, snapshot,
};
use crate::state::AppState;

/// Create the daemon API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(state.config());

    Router::new()
        .route("/healthz", get(healthz))
        .route("/about", get(about))
        .route("/metrics", get(metrics))
        .route("/dashboard", get(dashboard))
        // Analytics, refit per request
        .route("/ai/forecast", get(ai_forecast))
        .route("/ai/anomaly", get(ai_anomaly))
        .route("/ai/clusters", get(ai_clusters))
        // Report artifacts
        .route("/snapshot", get(snapshot).post(snapshot))
        .route("/report/html", get(report_html))
        .route("/report/img/{name}", get(report_img))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &DaemonConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
