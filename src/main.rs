//! Credit Scoring API Server
//!
//! Serves a pre-trained loan repayment model over HTTP: customer lookup,
//! population statistics, predictions and SHAP explanations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CREDIT SCORING API                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │  Routes   │  │  CustomerId  │  │  Handlers            │ │
//! │  │  (Axum)   │─▶│  extractor   │─▶│  customers / predict │ │
//! │  │           │  │  (404 gate)  │  │  / shap              │ │
//! │  └───────────┘  └──────────────┘  └──────────┬───────────┘ │
//! │                                              ▼             │
//! │   ┌──────────────────────────────────────────────────────┐ │
//! │   │ Artifacts (Arc, read-only, loaded once at startup)   │ │
//! │   │ customer table · scoring model · explainer · cutoff  │ │
//! │   └──────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod artifacts;
mod models;
mod handlers;
mod extract;
mod error;

#[cfg(test)]
mod tests;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

use artifacts::Artifacts;
use models::CustomerRecord;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    init_tracing(&config);

    tracing::info!("Credit Scoring API starting...");

    // Artifacts are mandatory, refuse to serve without them
    let artifacts = artifacts::load(&config).context("Failed to load artifacts")?;

    let state = AppState::new(config.clone(), artifacts);
    let app = create_router(state);

    let ip: IpAddr = config.host.parse()
        .with_context(|| format!("Invalid HOST '{}'", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &config::Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "credit_scoring_api=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub artifacts: Arc<Artifacts>,
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config, artifacts: Artifacts) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
            config,
        }
    }

    /// Single lookup every customer route goes through
    pub fn customer(&self, id: i64) -> AppResult<CustomerRecord<'_>> {
        self.artifacts.customers.get(id).ok_or_else(|| {
            tracing::debug!("Unknown customer id {}", id);
            AppError::customer_not_found()
        })
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handlers::health::ping))
        .route("/health", get(handlers::health::check))

        // Customers
        .route("/customers", get(handlers::customers::list))
        .route("/customers/:customer_id", get(handlers::customers::get))
        .route("/customers_stats", get(handlers::customers::stats))

        // Predictions
        .route("/predict/:customer_id", get(handlers::predict::predict))
        .route("/predict_proba/:customer_id", get(handlers::predict::predict_proba))

        // Explanations
        .route("/shap/:customer_id", get(handlers::shap::explain))
        .route("/shap_summary/:customer_id", get(handlers::shap::summary))

        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
