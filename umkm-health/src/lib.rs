//! UMKM Health Library
//!
//! Financial health assessment for small businesses: raw figures in, five
//! accounting ratios, a health tier and a short recommendation out.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                   umkm-health (Rust Service)                      │
//! │                            :8000                                  │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  request ─► ratios ─► classifier ─► recommendation ─► assessment  │
//! │                        rules|model     template|gemini    │       │
//! │                                                     storage?      │
//! │                                                  sqlite|supabase  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Ratios
//! Net profit margin, current ratio, debt to equity, return on assets and
//! asset turnover. Each is zero-guarded on its denominator.
//!
//! ## Tiers
//! `Sehat`, `Cukup Sehat` and `Rentan` from the rule scorer, or whatever
//! label a model artifact predicts.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assessment;
pub mod assessor;
pub mod classifier;
pub mod error;
pub mod http;
pub mod ratios;
pub mod recommendation;
pub mod request;
pub mod routes;
pub mod storage;

pub use assessment::{AnalysisRecord, AssessmentResult, PredictResponse};
pub use assessor::Assessor;
pub use classifier::{Classifier, HealthTier, ModelArtifact, ModelHandle, ModelSource, RuleScorer};
pub use error::{PredictError, ValidationError};
pub use ratios::{compute_ratios, FinancialInput, RatioSet};
pub use recommendation::{RecommendationGenerator, TextGenerator, FALLBACK_RECOMMENDATION};
pub use routes::{build_router, AppState};
pub use storage::{AnalysisStore, SqliteStore, StorageError, SupabaseStore};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use umkm_common::config::Config;

/// Main assessment service
pub struct HealthService {
    config: Config,
    state: AppState,
}

impl HealthService {
    /// Create the service and its collaborators.
    pub fn new(config: Config) -> Result<Self> {
        let state = AppState::from_config(&config).context("Failed to initialize service state")?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Load the model artifact ahead of the first request.
    ///
    /// A failure is logged only; the next request tries again.
    pub async fn warm_up(&self) {
        if let Classifier::Model(handle) = self.state.assessor.classifier() {
            let path = handle.source().path.display().to_string();
            match handle.get().await {
                Ok(artifact) => tracing::info!(
                    path = %path,
                    classes = ?artifact.classes,
                    "Model artifact ready"
                ),
                Err(e) => tracing::warn!(
                    path = %path,
                    error = %e,
                    "Model warm-up failed, requests will fail until it loads"
                ),
            }
        }
    }

    /// Start the HTTP server.
    pub async fn start(self) -> Result<()> {
        self.warm_up().await;

        let app = build_router(self.state.clone(), &self.config.cors);

        let addr: SocketAddr = self
            .config
            .listen_address()
            .parse()
            .with_context(|| format!("Invalid listen address {}", self.config.listen_address()))?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
