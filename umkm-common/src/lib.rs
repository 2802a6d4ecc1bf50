//! UMKM Common - Shared configuration, errors and logging for the UMKM health services.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - The configuration validation error
//! - Logging setup and trace ID helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AssessmentConfig, ClassifierConfig, ClassifierStrategy, Config, CorsConfig, LlmConfig,
    ObservabilityConfig, PersistenceBackend, PersistenceConfig, RecommendationMode,
    ResponseShape,
};
pub use error::{Error, Result};
