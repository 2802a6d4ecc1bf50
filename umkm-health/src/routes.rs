//! HTTP API routes.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;
use umkm_common::logging::generate_trace_id;
use umkm_common::{Config, CorsConfig};

use crate::assessment::{AnalysisRecord, PredictResponse};
use crate::assessor::Assessor;
use crate::error::{PredictError, ValidationError};
use crate::storage;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub assessor: Arc<Assessor>,
}

impl AppState {
    pub fn new(assessor: Assessor) -> Self {
        Self {
            assessor: Arc::new(assessor),
        }
    }

    /// Build the classifier, recommender and store from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = storage::from_config(config)?;
        Ok(Self::new(Assessor::from_config(config, store)))
    }
}

/// Build the application router.
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        // Both deployment variants expose the same handler
        .route("/predict", post(predict))
        .route("/api/predict", post(predict))
        .route("/api/analysis/latest", get(latest_analysis))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(cors))
        .with_state(state)
}

/// CORS policy from the configured allowlist.
///
/// A `*` entry allows any origin; credentials are only allowed for an
/// explicit list.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allows_any() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

// ============ Root / Health ============

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API Prediksi & Rekomendasi Aktif",
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub classifier: String,
    pub model_loaded: Option<bool>,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let classifier = state.assessor.classifier();
    let model_loaded = match classifier {
        crate::classifier::Classifier::Model(handle) => Some(handle.is_loaded()),
        crate::classifier::Classifier::Rules(_) => None,
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "umkm-health".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        classifier: classifier.name().to_string(),
        model_loaded,
    })
}

// ============ Assessment ============

async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictResponse>, PredictError> {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!("predict", trace_id = %trace_id);

    state
        .assessor
        .predict(&body)
        .instrument(span)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub user_id: Option<String>,
}

async fn latest_analysis(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<AnalysisRecord>, PredictError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ValidationError::MissingField("user_id"))?;

    state.assessor.latest(&user_id).await.map(Json)
}
