//! Health classification.
//!
//! # Strategies
//!
//! - **Rules**: deterministic threshold-and-sum scorer ([`RuleScorer`])
//! - **Model**: pre-trained estimator exported as a JSON artifact ([`ModelHandle`])
//!
//! The strategy is picked once at startup; both expose the same `classify`
//! capability over a [`RatioSet`].

pub mod model;
pub mod rules;

pub use model::{ModelArtifact, ModelError, ModelHandle, ModelSource};
pub use rules::{RuleScorer, ScoreBreakdown, ScoringThresholds};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::PredictError;
use crate::ratios::RatioSet;

/// Discrete health classification.
///
/// Serialized as its label. Rule-path labels follow the dashboard vocabulary
/// (`Sehat`, `Cukup Sehat`, `Rentan`); any other model label is carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthTier {
    Healthy,
    ModeratelyHealthy,
    AtRisk,
    /// Opaque label produced by a model artifact
    Label(String),
}

impl HealthTier {
    pub const HEALTHY_LABEL: &'static str = "Sehat";
    pub const MODERATE_LABEL: &'static str = "Cukup Sehat";
    pub const AT_RISK_LABEL: &'static str = "Rentan";

    /// Wire label.
    pub fn label(&self) -> &str {
        match self {
            Self::Healthy => Self::HEALTHY_LABEL,
            Self::ModeratelyHealthy => Self::MODERATE_LABEL,
            Self::AtRisk => Self::AT_RISK_LABEL,
            Self::Label(label) => label,
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for HealthTier {
    fn from(label: String) -> Self {
        match label.as_str() {
            Self::HEALTHY_LABEL => Self::Healthy,
            Self::MODERATE_LABEL => Self::ModeratelyHealthy,
            Self::AT_RISK_LABEL => Self::AtRisk,
            _ => Self::Label(label),
        }
    }
}

impl From<&str> for HealthTier {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<HealthTier> for String {
    fn from(tier: HealthTier) -> Self {
        match tier {
            HealthTier::Label(label) => label,
            other => other.label().to_string(),
        }
    }
}

/// Classification strategy selected at startup.
#[derive(Clone)]
pub enum Classifier {
    Rules(RuleScorer),
    Model(Arc<ModelHandle>),
}

impl Classifier {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rules(_) => "rules",
            Self::Model(_) => "model",
        }
    }

    /// Whether this is the statistical-model strategy.
    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Classify a ratio set.
    ///
    /// The model strategy fails with `ClassifierUnavailable` when its artifact
    /// cannot be loaded; it never falls back to the rules.
    pub async fn classify(&self, ratios: &RatioSet) -> Result<HealthTier, PredictError> {
        match self {
            Self::Rules(scorer) => Ok(scorer.classify(ratios)),
            Self::Model(handle) => {
                let artifact = handle.get().await.map_err(|e| {
                    tracing::error!(error = %e, "Model artifact unavailable");
                    PredictError::ClassifierUnavailable(e.to_string())
                })?;
                let label = artifact.predict(&ratios.features());
                Ok(HealthTier::from(label))
            }
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Classifier").field(&self.name()).finish()
    }
}
