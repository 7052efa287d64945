//! Explanation handlers

use axum::{extract::State, Json};

use crate::{AppState, AppResult};
use crate::extract::CustomerId;
use crate::models::{Explanation, ExplanationSummary, SUMMARY_SIZE};

/// Full local explanation of one customer
pub async fn explain(
    State(state): State<AppState>,
    CustomerId(id): CustomerId,
) -> AppResult<Json<Explanation>> {
    let record = state.customer(id)?;
    let explanation = state.artifacts.explainer.explain(&record)?;
    Ok(Json(explanation))
}

/// Top / bottom features by standardised attribution
pub async fn summary(
    State(state): State<AppState>,
    CustomerId(id): CustomerId,
) -> AppResult<Json<ExplanationSummary>> {
    let record = state.customer(id)?;
    let explanation = state.artifacts.explainer.explain(&record)?;
    Ok(Json(explanation.summarize(SUMMARY_SIZE)))
}
