//! Recommendation generator.
//!
//! Two paths:
//! - **Template**: fixed advisory sentence per tier, fully deterministic
//! - **Generated**: prompt with the tier and headline ratios sent to a
//!   [`TextGenerator`]; any failure is replaced by [`FALLBACK_RECOMMENDATION`]
//!
//! Producing a recommendation never fails the surrounding request.

mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};

use async_trait::async_trait;
use std::sync::Arc;

use crate::classifier::HealthTier;
use crate::ratios::RatioSet;

/// Substituted whenever generation fails or returns nothing.
pub const FALLBACK_RECOMMENDATION: &str =
    "Tidak dapat menghasilkan rekomendasi AI saat ini. Silakan coba lagi nanti.";

const HEALTHY_ADVICE: &str =
    "Kinerja keuangan sangat baik! Pertahankan efisiensi dan terus kembangkan usaha Anda.";
const MODERATE_ADVICE: &str = "Kinerja keuangan cukup baik, namun ada ruang untuk perbaikan. Fokus pada peningkatan margin laba dan efisiensi aset.";
const AT_RISK_ADVICE: &str = "Perlu perhatian khusus. Evaluasi struktur biaya, manajemen utang, dan strategi penjualan untuk meningkatkan kesehatan finansial.";
const UNKNOWN_TIER_ADVICE: &str =
    "Tinjau rasio keuangan Anda secara berkala dan bandingkan dengan periode sebelumnya.";

/// Errors from a generation attempt. Never leaves this module as a failure.
#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("text generator credentials are not configured")]
    MissingCredentials,

    #[error("text generator request failed: {0}")]
    Request(String),

    #[error("text generator returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("text generator returned an empty recommendation")]
    Empty,
}

/// External natural-language generator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generator name for logs.
    fn name(&self) -> &str;

    /// Produce free text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String, RecommendationError>;
}

/// Fixed advisory sentence for a tier.
pub fn template_for(tier: &HealthTier) -> &'static str {
    match tier {
        HealthTier::Healthy => HEALTHY_ADVICE,
        HealthTier::ModeratelyHealthy => MODERATE_ADVICE,
        HealthTier::AtRisk => AT_RISK_ADVICE,
        HealthTier::Label(_) => UNKNOWN_TIER_ADVICE,
    }
}

/// Prompt for the generated path: tier plus the three headline ratios.
pub fn build_prompt(tier: &HealthTier, ratios: &RatioSet) -> String {
    format!(
        r#"Anda adalah konsultan keuangan UMKM.
Data keuangan:
- Status Prediksi: {}
- Margin Laba Bersih: {:.2}%
- Rasio Lancar: {:.2}
- Utang thd. Ekuitas: {:.2}

Berikan 3 rekomendasi singkat dalam format poin-poin markdown.
Setiap poin berupa satu kalimat aksi yang jelas, tanpa paragraf pembuka atau penutup."#,
        tier,
        ratios.net_profit_margin * 100.0,
        ratios.current_ratio,
        ratios.debt_to_equity,
    )
}

/// Recommendation strategy.
#[derive(Clone)]
pub enum RecommendationGenerator {
    Template,
    Generated(Arc<dyn TextGenerator>),
}

impl RecommendationGenerator {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Generated(_) => "generated",
        }
    }

    /// Produce a recommendation. Always returns non-empty text.
    pub async fn recommend(&self, tier: &HealthTier, ratios: &RatioSet) -> String {
        match self {
            Self::Template => template_for(tier).to_string(),
            Self::Generated(generator) => {
                match Self::try_generate(generator.as_ref(), tier, ratios).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(
                            generator = generator.name(),
                            error = %e,
                            "Recommendation generation failed, using fallback"
                        );
                        FALLBACK_RECOMMENDATION.to_string()
                    }
                }
            }
        }
    }

    async fn try_generate(
        generator: &dyn TextGenerator,
        tier: &HealthTier,
        ratios: &RatioSet,
    ) -> Result<String, RecommendationError> {
        let prompt = build_prompt(tier, ratios);
        let text = generator.generate(&prompt).await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RecommendationError::Empty);
        }
        Ok(trimmed.to_string())
    }
}

impl std::fmt::Debug for RecommendationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mode())
    }
}
