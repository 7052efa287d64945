//! Customer handlers

use axum::{extract::State, response::{IntoResponse, Response}, Json};

use crate::{AppState, AppResult};
use crate::extract::CustomerId;
use crate::models::PopulationStats;

/// List customer ids in table order, capped at `LIST_LIMIT`
pub async fn list(State(state): State<AppState>) -> Json<Vec<i64>> {
    let ids = state.artifacts.customers.head(state.config.list_limit);
    Json(ids.to_vec())
}

/// All features of one customer, missing values as `""`
pub async fn get(
    State(state): State<AppState>,
    CustomerId(id): CustomerId,
) -> AppResult<Response> {
    let record = state.customer(id)?;
    Ok(Json(record).into_response())
}

/// count / mean / std for every numeric feature
pub async fn stats(State(state): State<AppState>) -> Json<PopulationStats> {
    Json(state.artifacts.customers.stats().clone())
}
