//! Google Gemini text generator.
//!
//! Thin `generateContent` client used for generated recommendations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{RecommendationError, TextGenerator};

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub temperature: f64,
    pub max_output_tokens: i64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            endpoint: "https://generativelanguage.googleapis.com".into(),
            timeout: Duration::from_secs(30),
            temperature: 0.4,
            max_output_tokens: 512,
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let client = crate::http::build_client(
            Client::builder()
                .timeout(config.timeout)
                .connect_timeout(Duration::from_secs(10).min(config.timeout)),
            "gemini",
        );

        Self { config, client }
    }

    fn url(&self) -> String {
        let model = if self.config.model.starts_with("models/") {
            self.config.model.clone()
        } else {
            format!("models/{}", self.config.model)
        };

        format!(
            "{}/v1beta/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, RecommendationError> {
        let start = Instant::now();

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RecommendationError::MissingCredentials)?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".into(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecommendationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecommendationError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| {
                RecommendationError::Request(format!("invalid response: {}", e.without_url()))
            })?;

        if let Some(err) = result.error {
            return Err(RecommendationError::Api {
                status: status.as_u16(),
                message: err.message,
            });
        }

        let text = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %self.config.model,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "Gemini generation finished"
        );

        Ok(text)
    }
}
