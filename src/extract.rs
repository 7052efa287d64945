//! Request extractors

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use crate::AppError;

/// Customer id taken from the `{customer_id}` path segment.
///
/// Anything that is not an integer is rejected with the same 404 as an
/// unknown id, so clients see a single not-found contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerId(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CustomerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::customer_not_found())?;

        raw.trim().parse::<i64>().map(CustomerId).map_err(|_| {
            tracing::debug!("Rejected malformed customer id '{}'", raw);
            AppError::customer_not_found()
        })
    }
}
