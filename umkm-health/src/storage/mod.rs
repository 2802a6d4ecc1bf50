//! Assessment persistence.
//!
//! One flat table of [`AnalysisRecord`]s. Backends:
//! - [`SqliteStore`]: local file through rusqlite
//! - [`SupabaseStore`]: PostgREST over HTTP

mod sqlite;
mod supabase;

pub use sqlite::SqliteStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use umkm_common::{Config, PersistenceBackend};

use crate::assessment::AnalysisRecord;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("store returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid stored record: {0}")]
    Decode(String),

    #[error("storage timed out after {0:?}")]
    Timeout(Duration),
}

/// Record store.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Insert one record.
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StorageError>;

    /// Most recent record for a user.
    async fn latest(&self, user_id: &str) -> Result<Option<AnalysisRecord>, StorageError>;
}

/// Build the configured store, or `None` when persistence is off.
pub fn from_config(config: &Config) -> anyhow::Result<Option<Arc<dyn AnalysisStore>>> {
    let persistence = &config.persistence;
    let store: Arc<dyn AnalysisStore> = match persistence.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::Sqlite => Arc::new(SqliteStore::open(&persistence.sqlite_path())?),
        PersistenceBackend::Supabase => {
            let secrets = &config.secrets.supabase;
            let (Some(url), Some(key)) = (secrets.url.clone(), secrets.key.clone()) else {
                anyhow::bail!("SUPABASE_URL and SUPABASE_KEY are required for the supabase backend");
            };
            Arc::new(SupabaseStore::new(SupabaseConfig {
                url,
                key,
                table: persistence.table.clone(),
                timeout: Duration::from_secs(persistence.timeout_secs),
            }))
        }
    };

    tracing::info!(backend = store.name(), "Persistence enabled");
    Ok(Some(store))
}
