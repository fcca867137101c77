//! HTTP server receiving GoCD stage-status notifications.
//!
//! Provides endpoints for:
//! - Stage-status notifications (`POST /stage-status`)
//! - Listing tracked incidents (`GET /incidents`)
//! - Forgetting tracked incidents (`DELETE /incidents`)
//! - Health checks (`GET /health`)

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::HandlingError;
use crate::events::StatusEvent;
use crate::reconciler::{IncidentReconciler, Outcome};

/// Build the HTTP router.
pub fn build_router(reconciler: Arc<IncidentReconciler>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stage-status", post(stage_status_handler))
        .route("/incidents", get(incidents_handler).delete(clear_incidents_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(reconciler)
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the address.
pub async fn run_server(reconciler: Arc<IncidentReconciler>, addr: &str) -> Result<()> {
    let app = build_router(reconciler);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("pagerduty-notify listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    channel: &'static str,
}

/// Response to a stage-status notification.
#[derive(Debug, Serialize)]
pub struct StageStatusResponse {
    /// `success` or `failure`
    pub status: ResponseStatus,
    /// Error messages, present on failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Event handled (including no-op events)
    Success,
    /// Event could not be handled
    Failure,
}

/// Tracked incidents.
#[derive(Debug, Serialize)]
struct IncidentsResponse {
    count: usize,
    incidents: BTreeMap<String, String>,
}

/// Result of forgetting tracked incidents.
#[derive(Debug, Serialize)]
struct ClearResponse {
    cleared: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(reconciler): State<Arc<IncidentReconciler>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        channel: reconciler.channel_name(),
    })
}

/// Stage-status handler. Any failure becomes a single 500 response.
async fn stage_status_handler(
    State(reconciler): State<Arc<IncidentReconciler>>,
    body: String,
) -> impl IntoResponse {
    match handle_stage_status(&reconciler, &body).await {
        Ok(outcome) => {
            debug!(?outcome, "Stage-status handled");
            (
                StatusCode::OK,
                Json(StageStatusResponse {
                    status: ResponseStatus::Success,
                    messages: vec![],
                }),
            )
        }
        Err(e) => {
            error!(error = %e, "Error handling stage-status message");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StageStatusResponse {
                    status: ResponseStatus::Failure,
                    messages: vec![e.to_string()],
                }),
            )
        }
    }
}

async fn handle_stage_status(
    reconciler: &IncidentReconciler,
    body: &str,
) -> Result<Outcome, HandlingError> {
    let event = StatusEvent::from_json(body)?;
    debug!(
        pipeline = %event.pipeline_name(),
        stage = %event.stage_name(),
        state = %event.stage_state(),
        "Received stage-status"
    );
    reconciler.handle(&event).await
}

async fn incidents_handler(
    State(reconciler): State<Arc<IncidentReconciler>>,
) -> impl IntoResponse {
    let incidents = reconciler.incidents().snapshot().await;
    Json(IncidentsResponse {
        count: incidents.len(),
        incidents,
    })
}

/// Drop local tracking, e.g. after incidents were closed by hand in `PagerDuty`.
async fn clear_incidents_handler(
    State(reconciler): State<Arc<IncidentReconciler>>,
) -> impl IntoResponse {
    let cleared = reconciler.incidents().clear().await;
    warn!(cleared, "Cleared incident tracking");
    Json(ClearResponse { cleared })
}
