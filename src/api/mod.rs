pub mod monitoring_api;

use axum::{
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::monitoring::MonitoringService;

/// Base path of the monitoring read surface
pub const MONITORING_BASE_PATH: &str = "/api/continuity/monitoring";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state for the web API
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MonitoringService>,
}

/// Create the main API router
pub fn create_api_router(state: AppState) -> Router {
    let monitoring = Router::new()
        .route("/dashboard", get(monitoring_api::get_dashboard))
        .route("/status", get(monitoring_api::get_status))
        .route("/health/detailed", get(monitoring_api::get_detailed_health))
        .route("/health/check", post(monitoring_api::trigger_health_check))
        .route("/performance", get(monitoring_api::get_performance))
        .route("/events", get(monitoring_api::get_recent_events))
        .route("/alerts/statistics", get(monitoring_api::get_alert_statistics))
        .route("/alerts/recent", get(monitoring_api::get_recent_alerts))
        .route("/alerts/test", post(monitoring_api::send_test_alert))
        .route("/alerts/config", get(monitoring_api::get_alert_configuration))
        .route(
            "/alerts/:id/acknowledge",
            post(monitoring_api::acknowledge_alert),
        )
        .route(
            "/metrics/session-capture",
            post(monitoring_api::record_session_capture),
        )
        .route(
            "/metrics/documentation-sync",
            post(monitoring_api::record_documentation_sync),
        )
        .route(
            "/metrics/quality-gate",
            post(monitoring_api::record_quality_gate),
        )
        .route(
            "/metrics/context-recovery",
            post(monitoring_api::record_context_recovery),
        );

    Router::new()
        .route("/health", get(monitoring_api::health_indicator))
        .route("/metrics", get(prometheus_metrics))
        .route("/version", get(version))
        .nest(MONITORING_BASE_PATH, monitoring)
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Prometheus text exposition
async fn prometheus_metrics(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.service.metrics().gather_metrics(),
    )
}

async fn version() -> Json<Value> {
    Json(json!({
        "service": "continuity-monitor",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
