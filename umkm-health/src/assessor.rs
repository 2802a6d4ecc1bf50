//! Assessment pipeline.
//!
//! ```text
//! validate -> compute ratios -> classify -> recommend -> assemble -> persist?
//! ```
//!
//! Any failing stage short-circuits, except recommendation which recovers
//! locally. There are no retries.

use std::sync::Arc;
use std::time::Duration;
use umkm_common::{ClassifierStrategy, Config, RecommendationMode, ResponseShape};

use crate::assessment::{AnalysisRecord, AssessmentResult, PredictResponse};
use crate::classifier::{Classifier, ModelHandle, ModelSource, RuleScorer};
use crate::error::{PredictError, ValidationError};
use crate::ratios::compute_ratios;
use crate::recommendation::{GeminiClient, GeminiConfig, RecommendationGenerator};
use crate::request::{parse_request, AssessmentRequest};
use crate::storage::{AnalysisStore, StorageError};

/// Runs one assessment per request.
#[derive(Clone)]
pub struct Assessor {
    classifier: Classifier,
    recommender: RecommendationGenerator,
    shape: ResponseShape,
    store: Option<Arc<dyn AnalysisStore>>,
    persist_timeout: Duration,
}

impl Assessor {
    pub fn new(classifier: Classifier, recommender: RecommendationGenerator) -> Self {
        Self {
            classifier,
            recommender,
            shape: ResponseShape::default(),
            store: None,
            persist_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>, timeout: Duration) -> Self {
        self.store = Some(store);
        self.persist_timeout = timeout;
        self
    }

    /// Build the pipeline from configuration.
    pub fn from_config(config: &Config, store: Option<Arc<dyn AnalysisStore>>) -> Self {
        let classifier = classifier_from_config(config);
        let recommender = recommender_from_config(config, &classifier);

        tracing::info!(
            classifier = classifier.name(),
            recommendation = recommender.mode(),
            shape = %config.assessment.response_shape,
            "Assessment pipeline configured"
        );

        let assessor =
            Self::new(classifier, recommender).with_shape(config.assessment.response_shape);
        match store {
            Some(store) => assessor.with_store(
                store,
                Duration::from_secs(config.persistence.timeout_secs),
            ),
            None => assessor,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn shape(&self) -> ResponseShape {
        self.shape
    }

    /// Whether requests must carry a `user_id`.
    pub fn requires_user(&self) -> bool {
        self.store.is_some()
    }

    /// Parse a raw body, assess it and render the configured response shape.
    pub async fn predict(&self, body: &[u8]) -> Result<PredictResponse, PredictError> {
        let request = parse_request(body, self.requires_user())?;
        let result = self.assess(request).await?;
        Ok(result.to_response(self.shape))
    }

    /// Run the pipeline on a validated request.
    pub async fn assess(&self, request: AssessmentRequest) -> Result<AssessmentResult, PredictError> {
        let ratios = compute_ratios(&request.input);
        let tier = self.classifier.classify(&ratios).await?;
        let recommendation = self.recommender.recommend(&tier, &ratios).await;

        let result = AssessmentResult {
            input: request.input,
            ratios,
            tier,
            recommendation,
            user_id: request.user_id,
        };

        if let Some(store) = &self.store {
            let record = result
                .to_record()
                .ok_or(PredictError::Validation(ValidationError::MissingUserId))?;
            self.persist(store.as_ref(), &record).await?;
        }

        tracing::info!(
            status = %result.tier,
            classifier = self.classifier.name(),
            persisted = self.store.is_some(),
            "Assessment completed"
        );

        Ok(result)
    }

    async fn persist(
        &self,
        store: &dyn AnalysisStore,
        record: &AnalysisRecord,
    ) -> Result<(), PredictError> {
        let outcome = tokio::time::timeout(self.persist_timeout, store.insert(record))
            .await
            .unwrap_or(Err(StorageError::Timeout(self.persist_timeout)));

        outcome.map_err(|e| {
            tracing::error!(backend = store.name(), error = %e, "Failed to persist analysis");
            PredictError::PersistenceFailed(e.to_string())
        })
    }

    /// Most recent stored assessment for a user.
    pub async fn latest(&self, user_id: &str) -> Result<AnalysisRecord, PredictError> {
        let store = self.store.as_ref().ok_or_else(|| {
            PredictError::NotFound("Persistence is disabled; no analyses are stored".into())
        })?;

        let latest = tokio::time::timeout(self.persist_timeout, store.latest(user_id))
            .await
            .unwrap_or(Err(StorageError::Timeout(self.persist_timeout)))
            .map_err(|e| PredictError::Internal(e.to_string()))?;

        latest.ok_or_else(|| PredictError::NotFound(format!("No analysis found for user {}", user_id)))
    }
}

impl std::fmt::Debug for Assessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assessor")
            .field("classifier", &self.classifier)
            .field("recommender", &self.recommender)
            .field("shape", &self.shape)
            .field("persistence", &self.store.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

fn classifier_from_config(config: &Config) -> Classifier {
    match config.classifier.strategy {
        ClassifierStrategy::Rules => Classifier::Rules(RuleScorer::new()),
        ClassifierStrategy::Model => {
            let settings = &config.classifier;
            let mut source = ModelSource::local(&settings.model_path)
                .with_timeout(Duration::from_secs(settings.download_timeout_secs));
            if let Some(url) = &settings.model_url {
                source = source.with_url(url);
            }
            Classifier::Model(Arc::new(ModelHandle::new(source)))
        }
    }
}

fn recommender_from_config(config: &Config, classifier: &Classifier) -> RecommendationGenerator {
    let generated = match config.assessment.recommendation {
        RecommendationMode::Template => false,
        RecommendationMode::Generated => true,
        RecommendationMode::Auto => classifier.is_model(),
    };

    if !generated {
        return RecommendationGenerator::Template;
    }

    if config.secrets.google_api_key.is_none() {
        tracing::warn!("No Google API key configured; generated recommendations will fall back");
    }

    let llm = &config.llm;
    let client = GeminiClient::new(GeminiConfig {
        api_key: config.secrets.google_api_key.clone(),
        model: llm.model.clone(),
        endpoint: llm.endpoint.clone(),
        timeout: Duration::from_secs(llm.timeout_secs),
        temperature: llm.temperature,
        max_output_tokens: llm.max_output_tokens,
    });
    RecommendationGenerator::Generated(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::model::fixtures::tree_artifact_json;
    use crate::classifier::{HealthTier, ModelArtifact};
    use crate::ratios::sample_input;
    use crate::recommendation::fakes::CannedGenerator;
    use crate::recommendation::FALLBACK_RECOMMENDATION;
    use crate::storage::fakes::MemoryStore;
    use serde_json::json;

    fn rules_assessor() -> Assessor {
        Assessor::new(
            Classifier::Rules(RuleScorer::new()),
            RecommendationGenerator::Template,
        )
    }

    fn reference_body(user_id: Option<&str>) -> Vec<u8> {
        let mut value = json!({
            "revenue": 10000, "cogs": 4000, "operating_expenses": 3000,
            "total_assets": 20000, "cash": 6000,
            "total_liabilities": 5000, "total_equity": 15000
        });
        if let Some(id) = user_id {
            value["user_id"] = json!(id);
        }
        value.to_string().into_bytes()
    }

    #[tokio::test]
    async fn test_reference_business_end_to_end() {
        let response = rules_assessor().predict(&reference_body(None)).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["prediction_status"], "Sehat");
        assert_eq!(json["net_profit_margin"], 0.3);
        assert_eq!(json["asset_turnover"], 0.5);
        assert!(!json["recommendation"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_narrow_shape() {
        let assessor = rules_assessor().with_shape(ResponseShape::Narrow);
        let response = assessor.predict(&reference_body(None)).await.unwrap();
        assert!(matches!(response, PredictResponse::Narrow(_)));
        assert_eq!(response.prediction_status(), &HealthTier::Healthy);
    }

    #[tokio::test]
    async fn test_model_strategy_uses_artifact_label() {
        let artifact = ModelArtifact::from_slice(tree_artifact_json().to_string().as_bytes()).unwrap();
        let canned = Arc::new(CannedGenerator::replying("- Jaga arus kas."));
        let assessor = Assessor::new(
            Classifier::Model(Arc::new(ModelHandle::preloaded(artifact))),
            RecommendationGenerator::Generated(canned),
        );

        let result = assessor
            .assess(AssessmentRequest {
                input: sample_input(),
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(result.tier, HealthTier::Healthy);
        assert_eq!(result.recommendation, "- Jaga arus kas.");
    }

    #[tokio::test]
    async fn test_generator_failure_still_succeeds() {
        let assessor = Assessor::new(
            Classifier::Rules(RuleScorer::new()),
            RecommendationGenerator::Generated(Arc::new(CannedGenerator::failing())),
        );
        let result = assessor
            .assess(AssessmentRequest {
                input: sample_input(),
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(result.recommendation, FALLBACK_RECOMMENDATION);
    }

    #[tokio::test]
    async fn test_persists_record_for_user() {
        let store = Arc::new(MemoryStore::default());
        let assessor = rules_assessor().with_store(store.clone(), Duration::from_secs(1));

        assessor.predict(&reference_body(Some("u-1"))).await.unwrap();
        assert_eq!(store.records.lock().await.len(), 1);

        let latest = assessor.latest("u-1").await.unwrap();
        assert_eq!(latest.prediction_status, "Sehat");
    }

    #[tokio::test]
    async fn test_persistence_requires_user() {
        let store = Arc::new(MemoryStore::default());
        let assessor = rules_assessor().with_store(store.clone(), Duration::from_secs(1));

        let err = assessor.predict(&reference_body(None)).await.unwrap_err();
        assert!(matches!(
            err,
            PredictError::Validation(ValidationError::MissingUserId)
        ));
        assert!(store.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_rejects_request() {
        let assessor = rules_assessor()
            .with_store(Arc::new(MemoryStore::failing()), Duration::from_secs(1));

        let err = assessor
            .predict(&reference_body(Some("u-1")))
            .await
            .unwrap_err();
        match err {
            PredictError::PersistenceFailed(message) => assert!(message.contains("connection reset")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_latest_without_persistence() {
        let err = rules_assessor().latest("u-1").await.unwrap_err();
        assert!(matches!(err, PredictError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_unknown_user() {
        let assessor =
            rules_assessor().with_store(Arc::new(MemoryStore::default()), Duration::from_secs(1));
        let err = assessor.latest("ghost").await.unwrap_err();
        assert!(matches!(err, PredictError::NotFound(_)));
    }

    #[test]
    fn test_auto_mode_follows_classifier() {
        let mut config = Config::default();
        let rules = classifier_from_config(&config);
        assert_eq!(recommender_from_config(&config, &rules).mode(), "template");

        config.classifier.strategy = ClassifierStrategy::Model;
        let model = classifier_from_config(&config);
        assert!(model.is_model());
        assert_eq!(recommender_from_config(&config, &model).mode(), "generated");

        config.assessment.recommendation = RecommendationMode::Template;
        assert_eq!(recommender_from_config(&config, &model).mode(), "template");
    }
}
