//! Health check handlers

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Liveness probe, kept byte-compatible with existing dashboards
pub async fn ping() -> Json<[&'static str; 1]> {
    Json(["Ping successfull"])
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    customers: usize,
    model: &'static str,
    explainer: &'static str,
    threshold: f64,
    artifacts: BTreeMap<&'static str, String>,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let artifacts = &state.artifacts;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        customers: artifacts.customers.len(),
        model: artifacts.model.kind(),
        explainer: artifacts.explainer.kind(),
        threshold: artifacts.threshold.value(),
        artifacts: artifacts.digests.clone(),
    })
}
