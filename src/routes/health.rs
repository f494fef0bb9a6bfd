// src/routes/health.rs
//! Liveness probe for the vitals service.
//!
//! `GET /health` answers without touching the document store or the
//! identity service, so orchestrators can tell a wedged process from a
//! slow dependency.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
