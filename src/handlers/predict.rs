//! Prediction handlers

use axum::{extract::State, Json};

use crate::{AppState, AppResult};
use crate::extract::CustomerId;
use crate::models::{ClassProbabilities, LoanResult};

/// Thresholded class: 1 when p(default) is above the configured cutoff
pub async fn predict(
    State(state): State<AppState>,
    CustomerId(id): CustomerId,
) -> AppResult<Json<LoanResult>> {
    let record = state.customer(id)?;
    let [_, p1] = state.artifacts.model.predict_proba(&record)?;
    let loan_result = state.artifacts.threshold.classify(p1);

    tracing::debug!("Customer {}: p1={:.4} -> {}", id, p1, loan_result);

    Ok(Json(LoanResult { loan_result }))
}

/// Raw class probabilities keyed by label
pub async fn predict_proba(
    State(state): State<AppState>,
    CustomerId(id): CustomerId,
) -> AppResult<Json<ClassProbabilities>> {
    let record = state.customer(id)?;
    let proba = state.artifacts.model.predict_proba(&record)?;
    Ok(Json(proba.into()))
}
