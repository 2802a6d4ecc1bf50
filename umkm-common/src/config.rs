//! Configuration management for the UMKM health services.
//!
//! The service reads a single JSON file at `~/.umkm-health/config.json`
//! (`UMKM_CONFIG` points somewhere else). Every section is optional.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Server
//! - `UMKM_BIND_ADDRESS` → network.bind
//! - `UMKM_PORT` / `PORT` → network.port
//! - `VERCEL_URL` → appended to cors.allowed_origins as `https://<host>`
//!
//! ## Engine
//! - `UMKM_CLASSIFIER` → classifier.strategy (`rules` | `model`)
//! - `UMKM_MODEL_PATH` → classifier.model_path
//! - `UMKM_MODEL_URL` → classifier.model_url
//! - `UMKM_RESPONSE_SHAPE` → assessment.response_shape (`full` | `narrow`)
//! - `UMKM_RECOMMENDATION` → assessment.recommendation (`auto` | `template` | `generated`)
//!
//! ## Persistence
//! - `UMKM_PERSISTENCE` → persistence.backend (`none` | `sqlite` | `supabase`)
//! - `UMKM_SQLITE_PATH` → persistence.sqlite_path
//! - `SUPABASE_URL` / `SUPABASE_KEY` → secrets.supabase.*
//!
//! ## LLM
//! - `GOOGLE_API_KEY` / `GEMINI_API_KEY` → secrets.google_api_key
//!
//! ## Logging
//! - `UMKM_LOG_LEVEL` / `UMKM_LOG_FORMAT` → observability.*

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".umkm-health"),
        |dirs| dirs.home_dir().join(".umkm-health"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("UMKM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

/// CORS allowlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. A single `*` entry allows any origin (without credentials).
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://127.0.0.1:3000".into(),
    ]
}

impl CorsConfig {
    /// Whether the allowlist is the wildcard.
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// API keys and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Google Generative Language API key
    #[serde(default)]
    pub google_api_key: Option<String>,

    /// Supabase project credentials
    #[serde(default)]
    pub supabase: SupabaseSecrets,
}

/// Supabase project URL and service key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupabaseSecrets {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Text generation settings for generated recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name passed to the generateContent endpoint
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,

    /// Upper bound on generated tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_output_tokens: i64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            timeout_secs: default_llm_timeout(),
            temperature: default_llm_temperature(),
            max_output_tokens: default_llm_max_tokens(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".into()
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_llm_temperature() -> f64 {
    0.4
}

fn default_llm_max_tokens() -> i64 {
    512
}

// ============================================================================
// Engine Configuration
// ============================================================================

/// Which classification strategy the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    /// Deterministic threshold-and-sum scorer
    #[default]
    Rules,
    /// Pre-trained model artifact
    Model,
}

/// Classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub strategy: ClassifierStrategy,

    /// Local path of the model artifact
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Remote location to fetch the artifact from when the local file is absent
    #[serde(default)]
    pub model_url: Option<String>,

    /// Download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::default(),
            model_path: default_model_path(),
            model_url: None,
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_model_path() -> String {
    "model_kesehatan_umkm.json".into()
}

fn default_download_timeout() -> u64 {
    60
}

/// Response payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Status, all five ratios and the recommendation
    #[default]
    Full,
    /// Status and recommendation only
    Narrow,
}

/// How recommendations are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMode {
    /// Template for the rule classifier, generated for the model classifier
    #[default]
    Auto,
    Template,
    Generated,
}

/// Assessment pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssessmentConfig {
    #[serde(default)]
    pub response_shape: ResponseShape,

    #[serde(default)]
    pub recommendation: RecommendationMode,
}

// ============================================================================
// Persistence Configuration
// ============================================================================

/// Where assessment records are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// Results are returned but never stored
    #[default]
    None,
    /// Local SQLite file
    Sqlite,
    /// Supabase (PostgREST) table
    Supabase,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// SQLite database path (defaults to `<config dir>/analysis.db`)
    #[serde(default)]
    pub sqlite_path: Option<String>,

    /// Remote table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Remote request timeout in seconds
    #[serde(default = "default_persistence_timeout")]
    pub timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            sqlite_path: None,
            table: default_table(),
            timeout_secs: default_persistence_timeout(),
        }
    }
}

impl PersistenceConfig {
    /// Whether assessments are stored at all.
    pub fn is_enabled(&self) -> bool {
        self.backend != PersistenceBackend::None
    }

    /// Effective SQLite path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("analysis.db"))
    }
}

fn default_table() -> String {
    "analysis_records".into()
}

fn default_persistence_timeout() -> u64 {
    10
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub assessment: AssessmentConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("UMKM_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("UMKM_PORT").or_else(|| lookup("PORT")) {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid port override"),
            }
        }
        if let Some(host) = lookup("VERCEL_URL") {
            let origin = format!("https://{}", host);
            if !self.cors.allowed_origins.contains(&origin) {
                self.cors.allowed_origins.push(origin);
            }
        }

        if let Some(level) = lookup("UMKM_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("UMKM_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        override_enum(&lookup, "UMKM_CLASSIFIER", &mut self.classifier.strategy);
        override_enum(&lookup, "UMKM_RESPONSE_SHAPE", &mut self.assessment.response_shape);
        override_enum(&lookup, "UMKM_RECOMMENDATION", &mut self.assessment.recommendation);
        override_enum(&lookup, "UMKM_PERSISTENCE", &mut self.persistence.backend);

        if let Some(path) = lookup("UMKM_MODEL_PATH") {
            self.classifier.model_path = path;
        }
        if let Some(url) = lookup("UMKM_MODEL_URL") {
            self.classifier.model_url = Some(url);
        }
        if let Some(path) = lookup("UMKM_SQLITE_PATH") {
            self.persistence.sqlite_path = Some(path);
        }

        if let Some(key) = lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.secrets.google_api_key = Some(key);
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.secrets.supabase.url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.secrets.supabase.key = Some(key);
        }
    }

    /// Check cross-field requirements that serde defaults cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if self.classifier.strategy == ClassifierStrategy::Model
            && self.classifier.model_path.trim().is_empty()
        {
            return Err(crate::Error::Config(
                "classifier.model_path is required for the model strategy".into(),
            ));
        }

        if self.persistence.backend == PersistenceBackend::Supabase {
            let supabase = &self.secrets.supabase;
            if supabase.url.is_none() || supabase.key.is_none() {
                return Err(crate::Error::Config(
                    "SUPABASE_URL and SUPABASE_KEY are required for the supabase backend".into(),
                ));
            }
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(crate::Error::Config(
                "cors.allowed_origins must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Socket address string for the listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

fn override_enum<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String>,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!(key, error = %e, "Ignoring invalid override"),
        }
    }
}

macro_rules! str_enum {
    ($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

str_enum!(ClassifierStrategy { "rules" => Rules, "model" => Model });
str_enum!(ResponseShape { "full" => Full, "narrow" => Narrow });
str_enum!(RecommendationMode {
    "auto" => Auto,
    "template" => Template,
    "generated" => Generated,
});
str_enum!(PersistenceBackend {
    "none" => None,
    "sqlite" => Sqlite,
    "supabase" => Supabase,
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, 8000);
        assert_eq!(config.network.bind, "127.0.0.1");
        assert_eq!(config.classifier.strategy, ClassifierStrategy::Rules);
        assert_eq!(config.assessment.response_shape, ResponseShape::Full);
        assert_eq!(config.assessment.recommendation, RecommendationMode::Auto);
        assert!(!config.persistence.is_enabled());
        assert_eq!(config.cors.allowed_origins.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_json::from_str(
            r#"{"classifier": {"strategy": "model"}, "assessment": {"response_shape": "narrow"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.classifier.strategy, ClassifierStrategy::Model);
        assert_eq!(parsed.classifier.model_path, "model_kesehatan_umkm.json");
        assert_eq!(parsed.assessment.response_shape, ResponseShape::Narrow);
        assert_eq!(parsed.llm.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"network": {"port": 5000}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.network.port, 5000);
        assert_eq!(config.listen_address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("PORT", "5000"),
            ("UMKM_CLASSIFIER", "model"),
            ("UMKM_PERSISTENCE", "supabase"),
            ("UMKM_RESPONSE_SHAPE", "Narrow"),
            ("GEMINI_API_KEY", "gm-key"),
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_KEY", "service-key"),
            ("VERCEL_URL", "umkm.vercel.app"),
        ]));

        assert_eq!(config.network.port, 5000);
        assert_eq!(config.classifier.strategy, ClassifierStrategy::Model);
        assert_eq!(config.persistence.backend, PersistenceBackend::Supabase);
        assert_eq!(config.assessment.response_shape, ResponseShape::Narrow);
        assert_eq!(config.secrets.google_api_key.as_deref(), Some("gm-key"));
        assert!(config
            .cors
            .allowed_origins
            .contains(&"https://umkm.vercel.app".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_umkm_port_wins_over_port() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[("PORT", "5000"), ("UMKM_PORT", "9100")]));
        assert_eq!(config.network.port, 9100);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("UMKM_PORT", "not-a-port"),
            ("UMKM_CLASSIFIER", "neural"),
        ]));
        assert_eq!(config.network.port, 8000);
        assert_eq!(config.classifier.strategy, ClassifierStrategy::Rules);
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let mut config = Config::default();
        config.persistence.backend = PersistenceBackend::Supabase;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn test_model_strategy_requires_path() {
        let mut config = Config::default();
        config.classifier.strategy = ClassifierStrategy::Model;
        config.classifier.model_path = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, crate::Error::Config(ref msg) if msg.contains("model_path")));
    }

    #[test]
    fn test_wildcard_cors() {
        let mut config = Config::default();
        assert!(!config.cors.allows_any());
        config.cors.allowed_origins = vec!["*".into()];
        assert!(config.cors.allows_any());
    }

    #[test]
    fn test_enum_display_round_trip() {
        for backend in [
            PersistenceBackend::None,
            PersistenceBackend::Sqlite,
            PersistenceBackend::Supabase,
        ] {
            assert_eq!(backend.to_string().parse::<PersistenceBackend>(), Ok(backend));
        }
    }
}
